//! Skill Eval Core Library
//!
//! Evaluation and decision harness for schema-typed agent skills: payload
//! validation, hierarchical execution tracing, metrics, confidence scoring,
//! risk evaluation and the auto-act / review / approval / block decision,
//! tied together by an instrumented executor.

pub mod config;
pub mod decision;
pub mod domain;
pub mod executor;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod session;
pub mod telemetry;
pub mod testdata;
pub mod tracer;
pub mod validation;

pub use config::{HarnessConfig, LoggingConfig};

pub use decision::{
    ConfidenceScorer, Decision, DecisionConfig, DecisionEngine, DecisionType, ExecutionHistory,
    RiskAssessment, RiskEvaluator, RuntimeRiskFactors,
};

pub use domain::{
    ExecutionContext, HarnessError, Result, RiskDeclaration, RiskLevel, SecurityMetadata,
    SkillDefinition, SkillMetadata,
};

pub use executor::{
    ExecutionResult, InstrumentedExecutor, InstrumentedWorkflowExecutor, Preflight,
    WorkflowOutcome, WorkflowStep,
};

pub use metrics::{AggregatedMetrics, ExecutionRecord, LatencyStats, MetricsCollector, MetricsSummary};

pub use reporting::{JsonReporter, SkillReport};

pub use telemetry::init_tracing;

pub use testdata::{load_test_cases, save_test_cases, TestCase, TestDataGenerator};

pub use session::{
    read_session_results, EvalConfig, EvalSession, EvalSessionResult, SavedSession, SessionSummary,
};

pub use tracer::{
    SkillTracer, SpanContext, SpanExporter, SpanGuard, SpanRef, SpanStatus, TracerConfig,
    TracerProvider,
};

pub use validation::{SchemaStage, SchemaValidator, ValidationResult};

/// Crate version, embedded in CLI output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
