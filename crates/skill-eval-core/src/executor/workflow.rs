//! Instrumented execution of skill chains.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::skill::{ExecutionResult, InstrumentedExecutor};
use crate::domain::{ExecutionContext, HarnessError, Result};
use crate::obs;
use crate::tracer::SpanStatus;
use crate::validation::validator::last_segment;

/// Skill logic for one step.
pub type StepLogic<'a> = Box<dyn FnOnce(&Value) -> anyhow::Result<Value> + 'a>;

/// One step of a workflow.
pub struct WorkflowStep<'a> {
    pub skill_id: String,
    pub version: String,
    pub logic: StepLogic<'a>,
    /// `"output.<field>" -> "input.<field>"`; when set, only mapped fields
    /// are passed to the step.
    pub field_mappings: Option<BTreeMap<String, String>>,
}

impl<'a> WorkflowStep<'a> {
    pub fn new(
        skill_id: impl Into<String>,
        version: impl Into<String>,
        logic: impl FnOnce(&Value) -> anyhow::Result<Value> + 'a,
    ) -> Self {
        Self {
            skill_id: skill_id.into(),
            version: version.into(),
            logic: Box::new(logic),
            field_mappings: None,
        }
    }

    pub fn with_mappings<K, V>(mut self, mappings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.field_mappings = Some(
            mappings
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

impl std::fmt::Debug for WorkflowStep<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("skill_id", &self.skill_id)
            .field("version", &self.version)
            .field("field_mappings", &self.field_mappings)
            .finish_non_exhaustive()
    }
}

/// Result of a completed workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutcome {
    /// Outputs of the last step.
    pub outputs: Value,
    /// Initial inputs merged with every step's outputs, later steps winning.
    pub accumulated: Value,
    pub steps: Vec<ExecutionResult>,
    pub trace_id: String,
}

/// Runs steps in order through an [`InstrumentedExecutor`] under one
/// workflow span.
#[derive(Debug, Clone)]
pub struct InstrumentedWorkflowExecutor {
    executor: InstrumentedExecutor,
}

impl InstrumentedWorkflowExecutor {
    pub fn new(executor: InstrumentedExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &InstrumentedExecutor {
        &self.executor
    }

    /// Execute `steps` in order. Chain incompatibility between consecutive
    /// steps is recorded and logged but does not stop the run; the first
    /// unsuccessful step does.
    pub fn execute_workflow(
        &self,
        workflow_id: &str,
        version: &str,
        steps: Vec<WorkflowStep<'_>>,
        initial_inputs: &Value,
    ) -> Result<WorkflowOutcome> {
        let _obs = obs::ExecutionSpan::enter_workflow(workflow_id, version);
        let tracer = self.executor.tracer();
        let mut span = tracer.trace_workflow_execution(workflow_id, version);
        let trace_id = span.trace_id().to_string();
        let step_count = steps.len();

        let mut accumulated = initial_inputs.as_object().cloned().unwrap_or_default();
        let mut outputs = Value::Object(Map::new());
        let mut results = Vec::with_capacity(step_count);
        let mut previous_skill: Option<String> = None;

        for (idx, step) in steps.into_iter().enumerate() {
            if let Some(producer) = &previous_skill {
                let chain = self.executor.validator().validate_chain_compatibility(
                    producer,
                    &step.skill_id,
                    step.field_mappings.as_ref(),
                );
                if !chain.is_valid() {
                    span.set_attribute(format!("step_{idx}.chain_validation_failed"), true);
                    warn!(
                        workflow_id,
                        step = idx,
                        producer = %producer,
                        consumer = %step.skill_id,
                        errors = ?chain.errors(),
                        "chain validation failed"
                    );
                }
            }

            let step_inputs = map_inputs(&accumulated, step.field_mappings.as_ref());
            let context = ExecutionContext::new()
                .with_extra("workflow_id", json!(workflow_id))
                .with_extra("step_idx", json!(idx));

            let result = self.executor.execute_skill(
                &step.skill_id,
                &step.version,
                &Value::Object(step_inputs),
                step.logic,
                Some(&context),
                None,
            );

            if !result.success {
                let reason = failure_reason(&result);
                span.set_status(SpanStatus::Error, Some(&reason));
                return Err(HarnessError::WorkflowStepFailed {
                    workflow_id: workflow_id.to_string(),
                    step: idx,
                    skill_id: step.skill_id,
                    reason,
                });
            }

            if let Some(produced) = result.outputs.as_object() {
                accumulated.extend(produced.clone());
            }
            outputs = result.outputs.clone();
            span.set_attribute(format!("step_{idx}.success"), true);
            previous_skill = Some(step.skill_id);
            results.push(result);
        }

        span.set_attribute("workflow.steps_completed", step_count);
        info!(workflow_id, steps = step_count, "workflow completed");

        Ok(WorkflowOutcome {
            outputs,
            accumulated: Value::Object(accumulated),
            steps: results,
            trace_id,
        })
    }
}

/// Select and rename fields for the next step. Without mappings every
/// accumulated field passes through.
pub fn map_inputs(
    available: &Map<String, Value>,
    field_mappings: Option<&BTreeMap<String, String>>,
) -> Map<String, Value> {
    match field_mappings {
        Some(mappings) if !mappings.is_empty() => mappings
            .iter()
            .filter_map(|(from, to)| {
                available
                    .get(last_segment(from))
                    .map(|v| (last_segment(to).to_string(), v.clone()))
            })
            .collect(),
        _ => available.clone(),
    }
}

fn failure_reason(result: &ExecutionResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    if !result.output_validation.is_valid() {
        return format!(
            "output validation failed: {}",
            result.output_validation.errors().join("; ")
        );
    }
    result.decision.reasoning.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_inputs_by_last_segment() {
        let available = json!({"partner_id": "p1", "score": 3, "noise": true});
        let available = available.as_object().unwrap();
        let mappings: BTreeMap<String, String> = [
            ("output.partner_id".to_string(), "input.partnerId".to_string()),
            ("output.missing".to_string(), "input.other".to_string()),
        ]
        .into_iter()
        .collect();

        let mapped = map_inputs(available, Some(&mappings));
        assert_eq!(Value::Object(mapped), json!({"partnerId": "p1"}));
    }

    #[test]
    fn test_map_inputs_passthrough() {
        let available = json!({"a": 1});
        let available = available.as_object().unwrap();
        assert_eq!(map_inputs(available, None), *available);
        assert_eq!(map_inputs(available, Some(&BTreeMap::new())), *available);
    }

    #[test]
    fn test_empty_mappings_keep_chain_valid() {
        use std::sync::Arc;

        use crate::decision::{DecisionConfig, DecisionEngine};
        use crate::domain::{SkillDefinition, SkillMetadata};
        use crate::metrics::MetricsCollector;
        use crate::tracer::{SkillTracer, TracerConfig, TracerProvider};
        use crate::validation::SchemaValidator;

        let validator = SchemaValidator::in_memory();
        validator.register(
            SkillDefinition::new("emit", "1.0.0")
                .with_input_schema(json!({"type": "object"}))
                .with_output_schema(json!({
                    "type": "object",
                    "required": ["a"],
                    "properties": {"a": {"type": "string"}}
                })),
            Some(SkillMetadata::with_risk_level("Low")),
        );
        validator.register(
            SkillDefinition::new("take", "1.0.0")
                .with_input_schema(json!({
                    "type": "object",
                    "required": ["a"],
                    "properties": {"a": {"type": "string"}}
                }))
                .with_output_schema(json!({"type": "object"})),
            Some(SkillMetadata::with_risk_level("Low")),
        );
        let workflows = InstrumentedWorkflowExecutor::new(InstrumentedExecutor::new(
            Arc::new(validator),
            Arc::new(SkillTracer::new(TracerConfig::with_provider(TracerProvider::None))),
            Arc::new(MetricsCollector::new()),
            Arc::new(DecisionEngine::new(DecisionConfig::default()).unwrap()),
        ));

        let steps = vec![
            WorkflowStep::new("emit", "1.0.0", |_| Ok(json!({"a": "x"}))),
            WorkflowStep::new("take", "1.0.0", |inputs: &Value| Ok(inputs.clone()))
                .with_mappings(Vec::<(String, String)>::new()),
        ];
        let outcome = workflows
            .execute_workflow("wf", "1.0.0", steps, &json!({}))
            .unwrap();
        assert_eq!(outcome.outputs, json!({"a": "x"}));

        let spans = workflows.executor().tracer().spans_for_trace(&outcome.trace_id);
        assert_eq!(spans.len(), 3);
        let wf = spans.iter().find(|s| s.name == "workflow.wf").unwrap();
        assert!(!wf.attributes.contains_key("step_1.chain_validation_failed"));
        assert_eq!(wf.attributes["step_1.success"], true);
    }
}
