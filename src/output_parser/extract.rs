//! Text-level helpers: reasoning-block removal and markdown fence scanning.
//!
//! Everything here works on `&str` slices and never allocates for fence
//! lookups, so the JSON layer can try candidates cheaply.

const FENCE: &str = "```";

/// Strip reasoning blocks, then trim.
pub fn preprocess(text: &str) -> String {
    strip_think_tags(text).trim().to_string()
}

/// Remove `<think>…</think>` and `<thinking>…</thinking>` blocks.
///
/// An opening tag without a closing tag swallows the rest of the text.
///
/// ```
/// use forge_agents::output_parser::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>plan</think>[1]"), "[1]");
/// assert_eq!(strip_think_tags("<thinking>cut off"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    ["think", "thinking"]
        .iter()
        .fold(text.to_string(), |acc, tag| remove_blocks(&acc, tag))
}

fn remove_blocks(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(&open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(&close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Body of the first fence tagged `json` (case-insensitive).
///
/// The body runs to the next closing fence, or to the end of the text when
/// the reply was cut off before closing it.
pub fn json_fence(text: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(offset) = text[from..].find(FENCE) {
        let after = from + offset + FENCE.len();
        let tag_end = text[after..]
            .find(|c: char| c.is_whitespace())
            .map_or(text.len(), |i| after + i);
        if text[after..tag_end].eq_ignore_ascii_case("json") {
            return Some(fence_body(text, tag_end));
        }
        from = after;
    }
    None
}

/// Body of the first fence of any kind, with a leading language-tag line
/// dropped.
pub fn first_fence(text: &str) -> Option<&str> {
    let start = text.find(FENCE)? + FENCE.len();
    let body = fence_body(text, start);

    match body.split_once('\n') {
        Some((first, rest)) if is_language_tag(first.trim()) => Some(rest.trim()),
        None if is_language_tag(body) => Some(""),
        _ => Some(body),
    }
}

fn fence_body(text: &str, start: usize) -> &str {
    let end = text[start..].find(FENCE).map_or(text.len(), |i| start + i);
    text[start..end].trim_matches(|c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n')
}

/// A lone word such as `json`, `yaml`, `c++`, or `objective-c`.
fn is_language_tag(line: &str) -> bool {
    !line.is_empty()
        && line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '.' | '#'))
}
