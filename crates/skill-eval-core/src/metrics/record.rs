use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decision::DecisionType;

/// One completed (or refused) execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub skill_id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    pub validation_passed: bool,
    pub decision_type: DecisionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ExecutionRecord {
    pub fn new(
        skill_id: impl Into<String>,
        version: impl Into<String>,
        duration_ms: f64,
        success: bool,
        validation_passed: bool,
        decision_type: DecisionType,
    ) -> Self {
        Self {
            skill_id: skill_id.into(),
            version: version.into(),
            timestamp: Utc::now(),
            duration_ms,
            success,
            validation_passed,
            decision_type,
            error_type: None,
            error_message: None,
            metadata: Map::new(),
        }
    }

    pub fn with_error(mut self, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
