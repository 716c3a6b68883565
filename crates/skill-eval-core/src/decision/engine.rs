//! Decision engine: turns confidence, risk and validation into a verdict.
//!
//! The rule cascade is evaluated in a fixed order and the first match wins.
//! Every branch returns a [`Decision`]; nothing here can fail at decision
//! time. Invalid thresholds are rejected when the engine is built.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::{HarnessError, Result, RiskLevel};

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

/// The four verdicts, from most to least permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    AutoAct,
    FlagForReview,
    RequireApproval,
    Block,
}

impl DecisionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoAct => "auto_act",
            Self::FlagForReview => "flag_for_review",
            Self::RequireApproval => "require_approval",
            Self::Block => "block",
        }
    }

    /// Higher is more permissive: Block 0, RequireApproval 1,
    /// FlagForReview 2, AutoAct 3.
    pub fn permissiveness(self) -> u8 {
        match self {
            Self::Block => 0,
            Self::RequireApproval => 1,
            Self::FlagForReview => 2,
            Self::AutoAct => 3,
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one attempted execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub decision_type: DecisionType,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub validation_passed: bool,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Decision {
    /// Auto-act and flag-for-review both proceed; review happens after.
    pub fn should_execute(&self) -> bool {
        matches!(
            self.decision_type,
            DecisionType::AutoAct | DecisionType::FlagForReview
        )
    }

    pub fn requires_human_approval(&self) -> bool {
        self.decision_type == DecisionType::RequireApproval
    }

    pub fn is_blocked(&self) -> bool {
        self.decision_type == DecisionType::Block
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub auto_act_threshold: f64,
    pub flag_threshold: f64,
    pub block_threshold: f64,
    pub critical_risk_requires_approval: bool,
    pub high_risk_min_confidence: f64,
    pub block_on_validation_failure: bool,
    pub use_execution_history: bool,
    pub min_executions_for_history: u64,
    pub history_success_rate_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            auto_act_threshold: 0.85,
            flag_threshold: 0.50,
            block_threshold: 0.30,
            critical_risk_requires_approval: true,
            high_risk_min_confidence: 0.75,
            block_on_validation_failure: true,
            use_execution_history: true,
            min_executions_for_history: 5,
            history_success_rate_threshold: 0.90,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("auto_act_threshold", self.auto_act_threshold),
            ("flag_threshold", self.flag_threshold),
            ("block_threshold", self.block_threshold),
            ("high_risk_min_confidence", self.high_risk_min_confidence),
            (
                "history_success_rate_threshold",
                self.history_success_rate_threshold,
            ),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(HarnessError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.block_threshold > self.flag_threshold {
            return Err(HarnessError::InvalidConfig(format!(
                "block_threshold ({}) must not exceed flag_threshold ({})",
                self.block_threshold, self.flag_threshold
            )));
        }
        if self.flag_threshold > self.auto_act_threshold {
            return Err(HarnessError::InvalidConfig(format!(
                "flag_threshold ({}) must not exceed auto_act_threshold ({})",
                self.flag_threshold, self.auto_act_threshold
            )));
        }
        if self.min_executions_for_history == 0 {
            return Err(HarnessError::InvalidConfig(
                "min_executions_for_history must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Execution history
// ---------------------------------------------------------------------------

/// Running success tally for one skill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHistory {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub success_rate: f64,
}

impl ExecutionHistory {
    pub fn from_counts(total: u64, successful: u64) -> Self {
        let successful = successful.min(total);
        Self {
            total_executions: total,
            successful_executions: successful,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
        }
    }

    fn record(&mut self, success: bool) {
        *self = Self::from_counts(
            self.total_executions + 1,
            self.successful_executions + u64::from(success),
        );
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DecisionEngine {
    config: DecisionConfig,
    history: Mutex<HashMap<String, ExecutionHistory>>,
}

impl DecisionEngine {
    /// Fails with `InvalidConfig` when the thresholds are inconsistent.
    pub fn new(config: DecisionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            history: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn make_decision(
        &self,
        skill_id: &str,
        confidence: f64,
        risk_level: RiskLevel,
        validation_passed: bool,
        execution_history: Option<&ExecutionHistory>,
    ) -> Decision {
        let cfg = &self.config;
        let mut metadata = Map::new();
        metadata.insert("skill_id".into(), json!(skill_id));
        metadata.insert("confidence".into(), json!(confidence));
        metadata.insert("risk_level".into(), json!(risk_level));

        let (decision_type, reasoning) = if cfg.block_on_validation_failure && !validation_passed {
            (DecisionType::Block, "Blocked: I/O validation failed".to_string())
        } else if cfg.critical_risk_requires_approval && risk_level == RiskLevel::Critical {
            (
                DecisionType::RequireApproval,
                "Requires approval: Critical risk level".to_string(),
            )
        } else if confidence < cfg.block_threshold {
            (
                DecisionType::Block,
                format!(
                    "Blocked: Confidence too low ({confidence:.2} < {})",
                    cfg.block_threshold
                ),
            )
        } else if risk_level == RiskLevel::High && confidence < cfg.high_risk_min_confidence {
            (
                DecisionType::FlagForReview,
                format!(
                    "Flagged: High risk requires confidence >= {}",
                    cfg.high_risk_min_confidence
                ),
            )
        } else if let Some(history) = execution_history.filter(|h| {
            cfg.use_execution_history
                && h.total_executions >= cfg.min_executions_for_history
                && h.success_rate < cfg.history_success_rate_threshold
        }) {
            metadata.insert("history".into(), json!(history));
            (
                DecisionType::FlagForReview,
                format!(
                    "Flagged: Low historical success rate ({:.1}%)",
                    history.success_rate * 100.0
                ),
            )
        } else if confidence >= cfg.auto_act_threshold {
            (
                DecisionType::AutoAct,
                format!("Auto-executing: High confidence ({confidence:.2}), acceptable risk"),
            )
        } else if confidence >= cfg.flag_threshold {
            (
                DecisionType::FlagForReview,
                format!("Flagged: Medium confidence ({confidence:.2})"),
            )
        } else {
            (
                DecisionType::RequireApproval,
                format!("Requires approval: Low confidence ({confidence:.2})"),
            )
        };

        debug!(skill_id, decision = %decision_type, confidence, %risk_level, "decision made");

        Decision {
            decision_type,
            confidence,
            risk_level,
            validation_passed,
            reasoning,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Fold one outcome into the skill's history.
    ///
    /// `confidence` is accepted for symmetry with the decision inputs and
    /// logged; it does not affect the tally.
    pub fn record_execution_outcome(&self, skill_id: &str, success: bool, confidence: f64) {
        let mut history = self.lock();
        let entry = history.entry(skill_id.to_string()).or_default();
        entry.record(success);
        debug!(
            skill_id,
            success,
            confidence,
            total = entry.total_executions,
            success_rate = entry.success_rate,
            "execution outcome recorded"
        );
    }

    pub fn get_execution_history(&self, skill_id: &str) -> Option<ExecutionHistory> {
        self.lock().get(skill_id).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ExecutionHistory>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
