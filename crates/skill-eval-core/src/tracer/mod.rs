//! Execution tracing: span records, the span tracer and export hooks.

pub mod export;
pub mod span;
#[allow(clippy::module_inception)]
pub mod tracer;

pub use export::{
    ConsoleExporter, NoopExporter, OtlpExporter, SpanExporter, TracerConfig, TracerProvider,
};
pub use span::{SpanContext, SpanRef, SpanStatus};
pub use tracer::{SkillTracer, SpanGuard};
