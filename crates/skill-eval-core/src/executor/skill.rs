//! Instrumented single-skill execution.
//!
//! Sequence: validate input, resolve and adjust risk, fetch history, score
//! confidence, decide. Blocked executions return without opening a trace
//! span. Everything else runs the skill logic inside a span, validates its
//! outputs and records metrics and history.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::decision::{
    ConfidenceScorer, Decision, DecisionEngine, ExecutionHistory, RiskAssessment, RiskEvaluator,
    RuntimeRiskFactors,
};
use crate::domain::ExecutionContext;
use crate::metrics::{ExecutionRecord, MetricsCollector};
use crate::obs;
use crate::tracer::{SkillTracer, SpanStatus};
use crate::validation::{SchemaValidator, ValidationResult};

/// Everything known about an execution before the skill logic runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preflight {
    pub input_validation: ValidationResult,
    pub risk: RiskAssessment,
    pub history: Option<ExecutionHistory>,
    pub confidence: f64,
    pub decision: Decision,
}

/// Outcome of one instrumented execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub outputs: Value,
    pub decision: Decision,
    pub input_validation: ValidationResult,
    pub output_validation: ValidationResult,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Absent for blocked executions, which open no span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Wraps skill logic with validation, tracing, metrics and decisions.
///
/// Collaborators are shared handles so several executors (one per worker)
/// can feed the same collector and engine.
#[derive(Debug, Clone)]
pub struct InstrumentedExecutor {
    validator: Arc<SchemaValidator>,
    tracer: Arc<SkillTracer>,
    metrics: Arc<MetricsCollector>,
    engine: Arc<DecisionEngine>,
    scorer: ConfidenceScorer,
    risk: RiskEvaluator,
}

impl InstrumentedExecutor {
    pub fn new(
        validator: Arc<SchemaValidator>,
        tracer: Arc<SkillTracer>,
        metrics: Arc<MetricsCollector>,
        engine: Arc<DecisionEngine>,
    ) -> Self {
        Self {
            validator,
            tracer,
            metrics,
            engine,
            scorer: ConfidenceScorer::new(),
            risk: RiskEvaluator::new(),
        }
    }

    pub fn validator(&self) -> &Arc<SchemaValidator> {
        &self.validator
    }

    pub fn tracer(&self) -> &Arc<SkillTracer> {
        &self.tracer
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    /// Validate, assess risk, score and decide without running anything.
    pub fn preflight(
        &self,
        skill_id: &str,
        inputs: &Value,
        context: Option<&ExecutionContext>,
        runtime_factors: Option<&RuntimeRiskFactors>,
    ) -> Preflight {
        let input_validation = self.validator.validate_input(skill_id, inputs);
        let static_risk = self.validator.get_risk_level(skill_id);
        let risk = self.risk.evaluate_risk(static_risk, runtime_factors);
        let history = self.engine.get_execution_history(skill_id);
        let confidence = self.scorer.calculate_confidence(
            skill_id,
            inputs,
            input_validation.is_valid(),
            history.as_ref(),
            context,
        );
        let decision = self.engine.make_decision(
            skill_id,
            confidence,
            risk.risk_level,
            input_validation.is_valid(),
            history.as_ref(),
        );
        obs::emit_decision_made(skill_id, decision.decision_type, confidence, risk.risk_level);

        Preflight {
            input_validation,
            risk,
            history,
            confidence,
            decision,
        }
    }

    /// Run `logic` under full instrumentation.
    ///
    /// Errors and panics from `logic` are contained here and reported through
    /// the result; this never fails or unwinds.
    pub fn execute_skill<F, E>(
        &self,
        skill_id: &str,
        version: &str,
        inputs: &Value,
        logic: F,
        context: Option<&ExecutionContext>,
        runtime_factors: Option<&RuntimeRiskFactors>,
    ) -> ExecutionResult
    where
        F: FnOnce(&Value) -> Result<Value, E>,
        E: Display,
    {
        let _span = obs::ExecutionSpan::enter(skill_id, version);
        obs::emit_execution_started(skill_id, version);
        let started = Instant::now();

        let Preflight {
            input_validation,
            risk,
            confidence,
            decision,
            ..
        } = self.preflight(skill_id, inputs, context, runtime_factors);

        if decision.is_blocked() {
            obs::emit_execution_blocked(skill_id, &decision.reasoning);
            let error = format!("Execution blocked: {}", decision.reasoning);
            let duration_ms = elapsed_ms(started);
            self.record(
                ExecutionRecord::new(
                    skill_id,
                    version,
                    duration_ms,
                    false,
                    input_validation.is_valid(),
                    decision.decision_type,
                )
                .with_error("blocked", error.clone())
                .with_metadata(record_metadata(confidence, &risk, None)),
                confidence,
            );
            obs::emit_execution_finished(skill_id, duration_ms, false);
            return ExecutionResult {
                success: false,
                outputs: Value::Object(Map::new()),
                decision,
                input_validation,
                output_validation: ValidationResult::not_run("execution blocked"),
                duration_ms,
                error: Some(error),
                trace_id: None,
            };
        }

        let mut span = self.tracer.trace_skill_execution(skill_id, version, inputs);
        let trace_id = span.trace_id().to_string();
        span.set_attribute("validation.input_passed", input_validation.is_valid());
        span.set_attribute("decision.type", decision.decision_type.as_str());
        span.set_attribute("decision.confidence", confidence);
        span.set_attribute("risk.level", risk.risk_level.as_str());

        let outcome = match catch_unwind(AssertUnwindSafe(|| logic(inputs))) {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(e)) => Err((short_type_name::<E>(), e.to_string())),
            Err(payload) => Err(("panic".to_string(), panic_message(payload.as_ref()))),
        };

        let (outputs, output_validation, error) = match outcome {
            Ok(outputs) => {
                span.set_attribute("execution.success", true);
                let output_validation = self.validator.validate_output(skill_id, &outputs);
                span.set_attribute("validation.output_passed", output_validation.is_valid());
                (outputs, output_validation, None)
            }
            Err((error_type, message)) => {
                span.set_status(SpanStatus::Error, Some(&message));
                span.set_attribute("execution.success", false);
                span.set_attribute("error.type", error_type.clone());
                warn!(skill_id, error_type = %error_type, error = %message, "skill logic failed");
                (
                    Value::Object(Map::new()),
                    ValidationResult::not_run("skill logic failed"),
                    Some((error_type, message)),
                )
            }
        };
        span.finish();

        let duration_ms = elapsed_ms(started);
        let success = error.is_none() && output_validation.is_valid();

        let mut record = ExecutionRecord::new(
            skill_id,
            version,
            duration_ms,
            success,
            input_validation.is_valid() && output_validation.is_valid(),
            decision.decision_type,
        )
        .with_metadata(record_metadata(confidence, &risk, Some(&trace_id)));
        if let Some((error_type, message)) = &error {
            record = record.with_error(error_type.clone(), message.clone());
        } else if !output_validation.is_valid() {
            record = record.with_error("output_validation", output_validation.errors().join("; "));
        }
        self.record(record, confidence);
        obs::emit_execution_finished(skill_id, duration_ms, success);

        ExecutionResult {
            success,
            outputs,
            decision,
            input_validation,
            output_validation,
            duration_ms,
            error: error.map(|(_, message)| message),
            trace_id: Some(trace_id),
        }
    }

    fn record(&self, record: ExecutionRecord, confidence: f64) {
        let skill_id = record.skill_id.clone();
        let success = record.success;
        self.metrics.record_execution(record);
        self.engine
            .record_execution_outcome(&skill_id, success, confidence);
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn record_metadata(
    confidence: f64,
    risk: &RiskAssessment,
    trace_id: Option<&str>,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("confidence".into(), json!(confidence));
    metadata.insert("risk_level".into(), json!(risk.risk_level));
    metadata.insert("trace_id".into(), json!(trace_id));
    metadata
}

/// `anyhow::Error` -> `Error`, `my_crate::SkillError` -> `SkillError`.
fn short_type_name<E>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "skill logic panicked".to_string()
    }
}
