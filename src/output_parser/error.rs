//! Failure type for structured extraction.

/// Reason used when the candidate text is not valid JSON.
pub const MALFORMED_JSON: &str = "malformed JSON";

/// Reason used when nothing is left after stripping reasoning blocks.
pub const EMPTY_REPLY: &str = "empty reply";

/// The extractor could not obtain a JSON value from a model reply.
///
/// `Display` renders only the short reason; the serde detail and the raw
/// reply travel alongside for logging.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct ExtractionFailure {
    /// Short reason, e.g. [`MALFORMED_JSON`].
    pub reason: String,
    /// Parser detail, when the candidate text reached serde.
    pub detail: Option<String>,
    /// The unmodified model reply.
    pub raw_text: String,
}

impl ExtractionFailure {
    pub(crate) fn malformed(detail: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: MALFORMED_JSON.to_string(),
            detail: Some(detail.into()),
            raw_text: raw.to_string(),
        }
    }

    pub(crate) fn empty(raw: &str) -> Self {
        Self {
            reason: EMPTY_REPLY.to_string(),
            detail: None,
            raw_text: raw.to_string(),
        }
    }

    /// First `max_len` characters of the raw reply, for log lines.
    pub fn raw_preview(&self, max_len: usize) -> String {
        truncate(&self.raw_text, max_len)
    }
}

/// Truncate to at most `max_len` characters, appending "..." when cut.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_reason_only() {
        let f = ExtractionFailure::malformed("expected value at line 1", "nope");
        assert_eq!(f.to_string(), "malformed JSON");
        assert_eq!(f.raw_text, "nope");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 4), "héll...");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
