//! Caller-supplied execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Context accompanying a skill execution.
///
/// The five recognised indicators feed the context-quality term of the
/// confidence score; anything else lands in `extra` and is carried through
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Outputs of upstream steps when running inside a chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_previous_results(mut self, results: Value) -> Self {
        self.previous_results = Some(results);
        self
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// True when nothing at all was supplied.
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.session_id.is_none()
            && self.previous_results.is_none()
            && self.timestamp.is_none()
            && self.metadata.is_empty()
            && self.extra.is_empty()
    }
}

/// Whether a JSON value carries meaningful content: not null, not a blank
/// string, not an empty array or object.
pub fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_context() {
        assert!(ExecutionContext::new().is_empty());
        assert!(!ExecutionContext::new().with_extra("step_idx", json!(0)).is_empty());
    }

    #[test]
    fn test_unknown_keys_land_in_extra() {
        let ctx: ExecutionContext =
            serde_json::from_value(json!({"user_id": "u1", "workflow_id": "wf"})).unwrap();
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert_eq!(ctx.extra.get("workflow_id"), Some(&json!("wf")));
    }

    #[test]
    fn test_is_meaningful() {
        assert!(!is_meaningful(&Value::Null));
        assert!(!is_meaningful(&json!("   ")));
        assert!(!is_meaningful(&json!([])));
        assert!(!is_meaningful(&json!({})));
        assert!(is_meaningful(&json!(0)));
        assert!(is_meaningful(&json!(false)));
        assert!(is_meaningful(&json!("x")));
    }
}
