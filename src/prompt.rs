use serde_json::{Map, Value};

/// Fill `{key}` placeholders from a map of state fields.
///
/// Values render by type:
/// - strings verbatim;
/// - arrays of strings as a `- item` bullet list;
/// - everything else as pretty-printed JSON.
///
/// Use `{{` and `}}` for literal braces, e.g. when showing the model a JSON
/// shape. Placeholders with no matching key are left as-is.
///
/// # Example
///
/// ```
/// use forge_agents::prompt::render;
/// use serde_json::json;
///
/// let vars = json!({"segment": "fintech", "trends": ["AI", "Open banking"]});
/// let out = render(
///     "Segment: {segment}\nTrends:\n{trends}\nFormat: {{\"name\": \"...\"}}",
///     vars.as_object().unwrap(),
/// );
/// assert_eq!(
///     out,
///     "Segment: fintech\nTrends:\n- AI\n- Open banking\nFormat: {\"name\": \"...\"}"
/// );
/// ```
pub fn render(template: &str, vars: &Map<String, Value>) -> String {
    // Single left-to-right scan: substituted values are never re-scanned,
    // so a `{key}` inside a value stays literal.
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail[1..].find('}') {
                let key = &tail[1..=end];
                if let Some(value) = placeholder_value(key, vars) {
                    out.push_str(&display_value(value));
                    rest = &tail[end + 2..];
                    continue;
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

fn placeholder_value<'a>(key: &str, vars: &'a Map<String, Value>) -> Option<&'a Value> {
    if key.is_empty() || key.contains('{') {
        return None;
    }
    vars.get(key)
}

/// Render one value the way [`render`] would.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => {
            let strings: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            bullet_list(&strings)
        }
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// One `- item` line per entry.
pub fn bullet_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
