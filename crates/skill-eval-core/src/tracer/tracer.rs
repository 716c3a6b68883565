//! Hierarchical span tracer.
//!
//! Open spans live on a stack per OS thread, so concurrent executions sharing
//! one tracer never see each other's parents. Each [`SpanGuard`] closes its
//! span exactly once when dropped, on every exit path including unwinding.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;

use super::export::{SpanExporter, TracerConfig};
use super::span::{SpanContext, SpanRef, SpanStatus};
use crate::obs;

#[derive(Debug, Clone)]
struct StackEntry {
    span_id: String,
    trace_id: String,
}

#[derive(Debug, Default)]
struct TracerState {
    stacks: HashMap<ThreadId, Vec<StackEntry>>,
    closed: Vec<SpanContext>,
}

/// Records spans for skill and workflow executions.
pub struct SkillTracer {
    config: TracerConfig,
    exporter: Box<dyn SpanExporter>,
    state: Mutex<TracerState>,
}

impl std::fmt::Debug for SkillTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillTracer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for SkillTracer {
    fn default() -> Self {
        Self::new(TracerConfig::default())
    }
}

impl SkillTracer {
    pub fn new(config: TracerConfig) -> Self {
        let exporter = config.exporter();
        Self {
            config,
            exporter,
            state: Mutex::new(TracerState::default()),
        }
    }

    /// Tracer with a caller-supplied export hook.
    pub fn with_exporter(config: TracerConfig, exporter: Box<dyn SpanExporter>) -> Self {
        Self {
            config,
            exporter,
            state: Mutex::new(TracerState::default()),
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Open a `skill.<id>` span parented on the innermost open span of this
    /// thread, if any.
    pub fn trace_skill_execution(
        &self,
        skill_id: &str,
        version: &str,
        inputs: &Value,
    ) -> SpanGuard<'_> {
        self.open(format!("skill.{skill_id}"), skill_attributes(skill_id, version, inputs), None)
    }

    /// Open a `skill.<id>` span under an explicit parent.
    pub fn trace_skill_execution_with_parent(
        &self,
        skill_id: &str,
        version: &str,
        inputs: &Value,
        parent: &SpanRef,
    ) -> SpanGuard<'_> {
        self.open(
            format!("skill.{skill_id}"),
            skill_attributes(skill_id, version, inputs),
            Some(parent),
        )
    }

    /// Open a `workflow.<id>` span.
    pub fn trace_workflow_execution(&self, workflow_id: &str, version: &str) -> SpanGuard<'_> {
        let mut attributes = BTreeMap::new();
        attributes.insert("workflow.id".to_string(), Value::from(workflow_id));
        attributes.insert("workflow.version".to_string(), Value::from(version));
        self.open(format!("workflow.{workflow_id}"), attributes, None)
    }

    /// Every closed span, in close order.
    pub fn get_spans(&self) -> Vec<SpanContext> {
        self.lock().closed.clone()
    }

    /// Closed spans of one trace.
    pub fn spans_for_trace(&self, trace_id: &str) -> Vec<SpanContext> {
        self.lock()
            .closed
            .iter()
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// Closed-span log as a pretty JSON array.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.lock().closed)
    }

    /// Drop the closed-span log. Open spans are unaffected.
    pub fn reset(&self) {
        self.lock().closed.clear();
    }

    /// Open spans across all threads.
    pub fn active_span_count(&self) -> usize {
        self.lock().stacks.values().map(Vec::len).sum()
    }

    fn open(
        &self,
        name: String,
        attributes: BTreeMap<String, Value>,
        parent: Option<&SpanRef>,
    ) -> SpanGuard<'_> {
        let thread = thread::current().id();
        let span_id = generate_id();

        let (parent_span_id, trace_id) = {
            let mut state = self.lock();
            let stack = state.stacks.entry(thread).or_default();
            let (parent_span_id, trace_id) = match parent {
                Some(p) => (Some(p.span_id.clone()), p.trace_id.clone()),
                None => match stack.last() {
                    Some(top) => (Some(top.span_id.clone()), top.trace_id.clone()),
                    None => (None, generate_id()),
                },
            };
            stack.push(StackEntry {
                span_id: span_id.clone(),
                trace_id: trace_id.clone(),
            });
            (parent_span_id, trace_id)
        };

        SpanGuard {
            tracer: self,
            thread,
            started: Instant::now(),
            closed: false,
            span: SpanContext {
                span_id,
                trace_id,
                parent_span_id,
                name,
                start_time: Utc::now(),
                end_time: None,
                duration_ms: None,
                attributes,
                status: SpanStatus::Ok,
                error_message: None,
            },
        }
    }

    fn close(&self, thread: ThreadId, span: SpanContext) {
        let depth = {
            let mut state = self.lock();
            let depth = match state.stacks.get_mut(&thread) {
                Some(stack) => {
                    if let Some(pos) = stack.iter().rposition(|e| e.span_id == span.span_id) {
                        stack.remove(pos);
                    }
                    stack.len()
                }
                None => 0,
            };
            if depth == 0 {
                state.stacks.remove(&thread);
            }
            state.closed.push(span.clone());
            depth
        };

        obs::emit_span_closed(&span.name, &span.span_id, span.status.as_str());
        self.exporter.export(&span, depth);
    }

    fn lock(&self) -> MutexGuard<'_, TracerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scoped handle to one open span. The only mutator of its span; closes it on
/// drop.
#[must_use = "the span closes as soon as the guard is dropped"]
pub struct SpanGuard<'t> {
    tracer: &'t SkillTracer,
    thread: ThreadId,
    started: Instant,
    closed: bool,
    span: SpanContext,
}

impl<'t> SpanGuard<'t> {
    pub fn span_id(&self) -> &str {
        &self.span.span_id
    }

    pub fn trace_id(&self) -> &str {
        &self.span.trace_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.span.parent_span_id.as_deref()
    }

    pub fn status(&self) -> SpanStatus {
        self.span.status
    }

    /// Handle for parenting spans explicitly, e.g. from another thread.
    pub fn as_parent(&self) -> SpanRef {
        SpanRef {
            span_id: self.span.span_id.clone(),
            trace_id: self.span.trace_id.clone(),
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.span.attributes.insert(key.into(), value.into());
    }

    /// Set the final status. A message, when given, replaces any earlier one.
    pub fn set_status(&mut self, status: SpanStatus, error_message: Option<&str>) {
        self.span.status = status;
        if let Some(msg) = error_message {
            self.span.error_message = Some(msg.to_string());
        }
    }

    pub fn record_error(&mut self, error: impl Display) {
        self.set_status(SpanStatus::Error, Some(&error.to_string()));
    }

    /// Run a fallible region inside this span and close it. An `Err` marks the
    /// span as error before being returned unchanged.
    pub fn run<T, E, F>(mut self, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let result = f(&mut self);
        if let Err(e) = &result {
            self.record_error(e);
        }
        result
    }

    /// Close now instead of at end of scope.
    pub fn finish(self) {}

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if thread::panicking() {
            self.span.status = SpanStatus::Error;
            if self.span.error_message.is_none() {
                self.span.error_message = Some("panicked while span was open".to_string());
            }
        }
        let mut span = std::mem::take(&mut self.span);
        span.seal(self.started.elapsed());
        self.tracer.close(self.thread, span);
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn skill_attributes(skill_id: &str, version: &str, inputs: &Value) -> BTreeMap<String, Value> {
    let input_keys: Vec<Value> = inputs
        .as_object()
        .map(|m| m.keys().map(|k| Value::from(k.as_str())).collect())
        .unwrap_or_default();
    let mut attributes = BTreeMap::new();
    attributes.insert("skill.id".to_string(), Value::from(skill_id));
    attributes.insert("skill.version".to_string(), Value::from(version));
    attributes.insert("skill.input_keys".to_string(), Value::Array(input_keys));
    attributes
}

/// 16 hex chars from a v4 uuid.
pub(crate) fn generate_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
