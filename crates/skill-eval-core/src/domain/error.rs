//! Error taxonomy for the evaluation harness.
//!
//! Data problems (missing skills, malformed schemas, invalid payloads) are
//! never errors here: they surface as [`crate::ValidationResult`] values.
//! `HarnessError` covers construction-time configuration problems, I/O on
//! reports and artifacts, and workflow step failures.

use std::path::PathBuf;

/// Harness-level errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("skills library not found at {}", .0.display())]
    LibraryNotFound(PathBuf),

    #[error("unknown tracer provider: {0} (expected console, otlp or none)")]
    UnknownProvider(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("unknown risk level: {0} (expected Low, Medium, High or Critical)")]
    UnknownRiskLevel(String),

    #[error("workflow {workflow_id} step {step} ({skill_id}) failed: {reason}")]
    WorkflowStepFailed {
        workflow_id: String,
        step: usize,
        skill_id: String,
        reason: String,
    },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("metadata parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = HarnessError::InvalidConfig("block_threshold must be in [0, 1]".to_string());
        assert!(err.to_string().contains("invalid configuration"));
        assert!(err.to_string().contains("block_threshold"));
    }

    #[test]
    fn test_library_not_found_display() {
        let err = HarnessError::LibraryNotFound(PathBuf::from("/nope/skills-library"));
        assert!(err.to_string().contains("/nope/skills-library"));
    }

    #[test]
    fn test_workflow_step_failed_display() {
        let err = HarnessError::WorkflowStepFailed {
            workflow_id: "onboarding".to_string(),
            step: 2,
            skill_id: "send_welcome".to_string(),
            reason: "smtp down".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("onboarding"));
        assert!(msg.contains("step 2"));
        assert!(msg.contains("smtp down"));
    }
}
