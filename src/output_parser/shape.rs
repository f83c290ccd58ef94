//! Expected shape of an extracted value.

use serde_json::Value;

use crate::state::json_kind;

/// What a step expects the model to have produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    /// Accept any JSON value.
    #[default]
    Any,
    /// Require an object.
    Object,
    /// Require an array; a single non-array value is wrapped into one.
    Sequence,
}

impl Shape {
    /// Normalize `value` to this shape, or describe the mismatch.
    pub fn normalize(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (Shape::Any, v) => Ok(v),
            (Shape::Object, v @ Value::Object(_)) => Ok(v),
            (Shape::Object, v) => Err(format!("expected a JSON object, got {}", json_kind(&v))),
            (Shape::Sequence, v @ Value::Array(_)) => Ok(v),
            (Shape::Sequence, v) => Ok(Value::Array(vec![v])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_wraps_single_object() {
        assert_eq!(
            Shape::Sequence.normalize(json!({"name": "x"})).unwrap(),
            json!([{"name": "x"}])
        );
        assert_eq!(Shape::Sequence.normalize(json!([1])).unwrap(), json!([1]));
    }

    #[test]
    fn object_rejects_arrays() {
        let err = Shape::Object.normalize(json!([1])).unwrap_err();
        assert_eq!(err, "expected a JSON object, got an array");
    }
}
