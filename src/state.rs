//! Workflow state threaded through a graph run.
//!
//! [`WorkflowState`] is an open JSON object: any step may add fields. Two
//! field names are reserved and read by the engine itself:
//!
//! - `next`: the step to run after the current one, or the terminal
//!   sentinel [`END`](crate::router::END). Absent means "use the graph's
//!   default edge".
//! - `error`: a human-readable failure description. Once set it is never
//!   cleared or replaced within the same run.
//!
//! Every mutator takes `&self` and returns a new snapshot; the incoming state
//! is never changed in place.

use crate::error::{FlowError, Result, StepFailure};
use crate::router::Next;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved field holding the next step name or the terminal sentinel.
pub const NEXT_FIELD: &str = "next";

/// Reserved field holding the failure description of a run.
pub const ERROR_FIELD: &str = "error";

/// Accumulated, append-only state of one workflow run.
///
/// # Example
///
/// ```
/// use forge_agents::WorkflowState;
/// use serde_json::json;
///
/// let initial = WorkflowState::new().input("market_segment", "dev tools");
/// let updated = initial.with("generated_ideas", json!([{"name": "Lintly"}]));
///
/// assert!(initial.get("generated_ideas").is_none());
/// assert_eq!(updated.get_str("market_segment"), Some("dev tools"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    fields: Map<String, Value>,
}

impl WorkflowState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a JSON value. The value must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(FlowError::InvalidConfig(format!(
                "workflow state must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Serialize a typed view (e.g. a pipeline's request struct) into a state.
    pub fn from_view<T: Serialize + ?Sized>(view: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(view)?)
    }

    /// Consuming setter for assembling caller inputs before a run.
    pub fn input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Return a new snapshot with `key` set to `value`.
    ///
    /// Writing `error` on a state that already carries one is ignored.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.set(key.into(), value.into());
        next
    }

    /// Return a new snapshot with every `(key, value)` pair applied.
    pub fn with_fields<I, K>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut next = self.clone();
        for (key, value) in fields {
            next.set(key.into(), value);
        }
        next
    }

    fn set(&mut self, key: String, value: Value) {
        if key == ERROR_FIELD && self.has_error() {
            return;
        }
        self.fields.insert(key, value);
    }

    /// The routing annotation left by the last step, if any.
    pub fn next(&self) -> Option<Next> {
        self.get_str(NEXT_FIELD).map(Next::parse)
    }

    pub fn with_next(&self, next: Next) -> Self {
        self.with(NEXT_FIELD, next.as_str().to_string())
    }

    /// Return a new snapshot with the routing annotation removed, so the
    /// step that receives it starts with `next` absent.
    pub fn without_next(&self) -> Self {
        let mut next = self.clone();
        next.fields.remove(NEXT_FIELD);
        next
    }

    /// The failure description, if the run has failed.
    pub fn error(&self) -> Option<&str> {
        match self.fields.get(ERROR_FIELD) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// Mark the run as failed: sets `error` (unless already set) and routes
    /// to terminal.
    pub fn fail(&self, failure: &StepFailure) -> Self {
        self.with(ERROR_FIELD, failure.to_string())
            .with_next(Next::Terminal)
    }

    /// Look up a required input, rejecting absent, null, and empty values.
    pub fn require(&self, field: &str) -> std::result::Result<&Value, StepFailure> {
        match self.fields.get(field) {
            Some(value) if !is_blank(value) => Ok(value),
            _ => Err(StepFailure::Precondition {
                field: field.to_string(),
            }),
        }
    }

    /// Project the state into a typed view. Unknown fields are ignored by
    /// serde unless the view opts into `deny_unknown_fields`.
    pub fn project<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    /// Return a new snapshot with every field of a typed view written over
    /// this state.
    pub fn merge<T: Serialize + ?Sized>(&self, view: &T) -> Result<Self> {
        match serde_json::to_value(view)? {
            Value::Object(fields) => Ok(self.with_fields(fields)),
            other => Err(FlowError::InvalidConfig(format!(
                "cannot merge {} into workflow state",
                json_kind(&other)
            ))),
        }
    }
}

impl From<Map<String, Value>> for WorkflowState {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for WorkflowState {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Null, whitespace-only strings, and empty containers count as missing.
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn with_is_copy_on_write() {
        let original = WorkflowState::new().input("a", 1);
        let updated = original.with("b", 2);

        assert_eq!(original.len(), 1);
        assert_eq!(updated.len(), 2);
        assert_eq!(updated.get("a"), Some(&json!(1)));
    }

    #[test]
    fn error_is_never_replaced() {
        let failed = WorkflowState::new().fail(&StepFailure::Rejected("first".into()));
        let again = failed.fail(&StepFailure::Rejected("second".into()));
        let overwritten = again.with(ERROR_FIELD, "third");

        assert_eq!(overwritten.error(), Some("first"));
        assert_eq!(overwritten.next(), Some(Next::Terminal));
    }

    #[test]
    fn require_rejects_blank_values() {
        let state = WorkflowState::new()
            .input("empty_str", "  ")
            .input("empty_list", json!([]))
            .input("null", Value::Null)
            .input("zero", 0)
            .input("ok", "value");

        for field in ["empty_str", "empty_list", "null", "absent"] {
            let err = state.require(field).unwrap_err();
            assert_eq!(
                err,
                StepFailure::Precondition {
                    field: field.to_string()
                }
            );
        }
        assert!(state.require("zero").is_ok());
        assert_eq!(state.require("ok").unwrap(), &json!("value"));
    }

    #[test]
    fn next_round_trips_through_the_field() {
        let state = WorkflowState::new().with_next(Next::step("validate_ideas"));
        assert_eq!(state.get_str(NEXT_FIELD), Some("validate_ideas"));
        assert_eq!(state.next(), Some(Next::step("validate_ideas")));

        let done = state.with_next(Next::Terminal);
        assert_eq!(done.next(), Some(Next::Terminal));
    }

    #[test]
    fn without_next_leaves_the_original_alone() {
        let routed = WorkflowState::new()
            .input("a", 1)
            .with_next(Next::step("b"));
        let cleared = routed.without_next();

        assert_eq!(cleared.next(), None);
        assert_eq!(cleared.get("a"), Some(&json!(1)));
        assert_eq!(routed.next(), Some(Next::step("b")));
    }

    #[test]
    fn from_value_requires_object() {
        assert!(WorkflowState::from_value(json!({"x": 1})).is_ok());
        let err = WorkflowState::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct View {
        market_segment: String,
        #[serde(default)]
        trends_to_consider: Option<Vec<String>>,
    }

    #[test]
    fn typed_views_project_and_merge() {
        let state = WorkflowState::new()
            .input("market_segment", "fintech")
            .input("unrelated", true);

        let view: View = state.project().unwrap();
        assert_eq!(view.market_segment, "fintech");
        assert!(view.trends_to_consider.is_none());

        let merged = state
            .merge(&View {
                market_segment: "health".into(),
                trends_to_consider: Some(vec!["AI".into()]),
            })
            .unwrap();
        assert_eq!(merged.get_str("market_segment"), Some("health"));
        assert_eq!(merged.get("unrelated"), Some(&json!(true)));
        assert_eq!(state.get_str("market_segment"), Some("fintech"));
    }

    #[test]
    fn serializes_as_plain_object() {
        let state = WorkflowState::new().input("k", "v");
        assert_eq!(serde_json::to_string(&state).unwrap(), r#"{"k":"v"}"#);
    }
}
