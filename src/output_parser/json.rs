//! JSON extraction from model replies.
//!
//! Candidate selection, in priority order:
//!
//! 1. the body of the first fence tagged `json`;
//! 2. otherwise the body of the first fence of any kind;
//! 3. otherwise the whole reply.
//!
//! Reasoning blocks are stripped before any of this. The first candidate
//! that exists is the one parsed: a `json` fence with a broken body is a
//! failure even if some later text would have parsed.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::output_parser::error::ExtractionFailure;
use crate::output_parser::extract::{first_fence, json_fence, preprocess};

/// Which candidate the value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    JsonFence,
    Fence,
    WholeText,
}

/// Extract a JSON value from a model reply.
///
/// ```
/// use forge_agents::output_parser::extract;
/// use serde_json::json;
///
/// let reply = "Sure!\n```json\n[{\"name\": \"Lintly\"}]\n```";
/// assert_eq!(extract(reply).unwrap(), json!([{"name": "Lintly"}]));
///
/// let err = extract("I could not think of anything.").unwrap_err();
/// assert_eq!(err.reason, "malformed JSON");
/// ```
pub fn extract(raw: &str) -> Result<Value, ExtractionFailure> {
    extract_with_source(raw).map(|(value, _)| value)
}

/// Like [`extract`], also reporting which candidate matched.
pub fn extract_with_source(raw: &str) -> Result<(Value, Source), ExtractionFailure> {
    let cleaned = preprocess(raw);
    if cleaned.is_empty() {
        return Err(ExtractionFailure::empty(raw));
    }

    let (candidate, source) = if let Some(body) = json_fence(&cleaned) {
        (body, Source::JsonFence)
    } else if let Some(body) = first_fence(&cleaned) {
        (body, Source::Fence)
    } else {
        (cleaned.as_str(), Source::WholeText)
    };

    serde_json::from_str::<Value>(candidate)
        .map(|value| (value, source))
        .map_err(|e| ExtractionFailure::malformed(e.to_string(), raw))
}

/// Extract and deserialize into `T`. A shape mismatch against `T` is
/// reported as malformed JSON as well.
pub fn extract_as<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractionFailure> {
    let value = extract(raw)?;
    serde_json::from_value(value).map_err(|e| ExtractionFailure::malformed(e.to_string(), raw))
}
