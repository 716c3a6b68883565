//! Structured observability hooks for skill execution lifecycle events.
//!
//! This module provides:
//! - Execution-scoped tracing spans via `ExecutionSpan` RAII guard
//! - Emission functions for key lifecycle events: start, decision, block,
//!   finish, chain validation, span close
//!
//! Events are emitted at `info!` level (configurable via `SKILL_EVAL_LOG`).
//! For JSON output, set `SKILL_EVAL_LOG_FORMAT=json`.

use tracing::info;

use crate::decision::DecisionType;
use crate::domain::RiskLevel;

/// RAII guard that enters a skill-scoped tracing span for the duration of an
/// execution.
///
/// # Example
///
/// ```ignore
/// let _span = ExecutionSpan::enter("lead_scorer", "1.0.0");
/// // All tracing calls are now associated with skill_id = "lead_scorer"
/// ```
pub struct ExecutionSpan {
    _span: tracing::span::EnteredSpan,
}

impl ExecutionSpan {
    /// Create and enter a span tagged with the skill id and version.
    pub fn enter(skill_id: &str, version: &str) -> Self {
        let span = tracing::info_span!("skill_eval.execution", skill_id = %skill_id, version = %version);
        Self {
            _span: span.entered(),
        }
    }

    /// Workflow-scoped variant.
    pub fn enter_workflow(workflow_id: &str, version: &str) -> Self {
        let span =
            tracing::info_span!("skill_eval.workflow", workflow_id = %workflow_id, version = %version);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: execution started.
pub fn emit_execution_started(skill_id: &str, version: &str) {
    info!(event = "execution.started", skill_id = %skill_id, version = %version);
}

/// Emit event: decision reached for an execution.
pub fn emit_decision_made(
    skill_id: &str,
    decision: DecisionType,
    confidence: f64,
    risk_level: RiskLevel,
) {
    info!(
        event = "decision.made",
        skill_id = %skill_id,
        decision = %decision,
        confidence = confidence,
        risk_level = %risk_level,
    );
}

/// Emit event: execution refused by the decision engine (warning level).
pub fn emit_execution_blocked(skill_id: &str, reasoning: &str) {
    tracing::warn!(event = "execution.blocked", skill_id = %skill_id, reasoning = %reasoning);
}

/// Emit event: execution finished with duration and outcome.
pub fn emit_execution_finished(skill_id: &str, duration_ms: f64, success: bool) {
    info!(
        event = "execution.finished",
        skill_id = %skill_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: chain compatibility checked between two skills.
pub fn emit_chain_validated(producer: &str, consumer: &str, valid: bool) {
    info!(
        event = "chain.validated",
        producer = %producer,
        consumer = %consumer,
        valid = valid,
    );
}

/// Emit event: a trace span was closed.
pub fn emit_span_closed(name: &str, span_id: &str, status: &str) {
    tracing::debug!(event = "span.closed", name = %name, span_id = %span_id, status = %status);
}
