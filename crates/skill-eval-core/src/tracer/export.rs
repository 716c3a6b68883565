//! Span export hooks.
//!
//! The tracer calls its exporter once per closed span, after the span has
//! been appended to the local log. Exporters must not panic.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::span::{SpanContext, SpanStatus};
use crate::domain::HarnessError;

/// Destination for closed spans.
pub trait SpanExporter: Send + Sync {
    /// `depth` is the number of spans still open on the closing execution's
    /// stack, which the console exporter uses for indentation.
    fn export(&self, span: &SpanContext, depth: usize);
}

/// Which exporter a tracer should use. Names parse case-insensitively,
/// from config files as well as the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TracerProvider {
    #[default]
    Console,
    Otlp,
    None,
}

impl FromStr for TracerProvider {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "otlp" => Ok(Self::Otlp),
            "none" => Ok(Self::None),
            _ => Err(HarnessError::UnknownProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for TracerProvider {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for TracerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Console => write!(f, "console"),
            Self::Otlp => write!(f, "otlp"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Tracer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub provider: TracerProvider,
    /// Remote collector endpoint, e.g. `http://localhost:4317`.
    pub endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            provider: TracerProvider::Console,
            endpoint: None,
            service_name: "skill-eval".to_string(),
        }
    }
}

impl TracerConfig {
    pub fn with_provider(provider: TracerProvider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Build the exporter this configuration names.
    pub fn exporter(&self) -> Box<dyn SpanExporter> {
        match self.provider {
            TracerProvider::Console => Box::new(ConsoleExporter),
            TracerProvider::Otlp => Box::new(OtlpExporter::new(self.endpoint.clone())),
            TracerProvider::None => Box::new(NoopExporter),
        }
    }
}

/// Pretty-prints each span on stdout, indented by nesting depth.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleExporter;

impl ConsoleExporter {
    pub fn render(span: &SpanContext, depth: usize) -> String {
        let indent = "  ".repeat(depth);
        let symbol = match span.status {
            SpanStatus::Ok => "✓",
            SpanStatus::Error => "✗",
        };
        let duration = span
            .duration_ms
            .map(|ms| format!("{ms:.2}ms"))
            .unwrap_or_else(|| "?".to_string());
        let mut line = format!("{indent}{symbol} {} ({duration})", span.name);
        if let Some(err) = &span.error_message {
            line.push_str(&format!("\n{indent}  Error: {err}"));
        }
        line
    }
}

impl SpanExporter for ConsoleExporter {
    fn export(&self, span: &SpanContext, depth: usize) {
        println!("{}", Self::render(span, depth));
    }
}

/// Discards spans; they remain available from the tracer's local log.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExporter;

impl SpanExporter for NoopExporter {
    fn export(&self, _span: &SpanContext, _depth: usize) {}
}

/// Placeholder for a remote collector.
///
/// Wire export is not implemented: the first span logs a warning, later ones
/// are dropped at debug level. Never fails the caller.
#[derive(Debug)]
pub struct OtlpExporter {
    endpoint: Option<String>,
    warned: AtomicBool,
}

impl OtlpExporter {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            warned: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl SpanExporter for OtlpExporter {
    fn export(&self, span: &SpanContext, _depth: usize) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                endpoint = self.endpoint.as_deref().unwrap_or("<unset>"),
                "OTLP span export is not implemented; spans stay in the local log"
            );
        }
        debug!(span_id = %span.span_id, name = %span.name, "otlp export skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(status: SpanStatus, error: Option<&str>) -> SpanContext {
        SpanContext {
            span_id: "s1".into(),
            trace_id: "t1".into(),
            name: "skill.lead_scorer".into(),
            duration_ms: Some(3.14159),
            status,
            error_message: error.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("console".parse::<TracerProvider>().unwrap(), TracerProvider::Console);
        assert_eq!("OTLP".parse::<TracerProvider>().unwrap(), TracerProvider::Otlp);
        assert_eq!("none".parse::<TracerProvider>().unwrap(), TracerProvider::None);
        assert!(matches!(
            "jaeger".parse::<TracerProvider>(),
            Err(HarnessError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_console_render() {
        assert_eq!(
            ConsoleExporter::render(&span(SpanStatus::Ok, None), 1),
            "  ✓ skill.lead_scorer (3.14ms)"
        );
        let rendered = ConsoleExporter::render(&span(SpanStatus::Error, Some("boom")), 0);
        assert!(rendered.starts_with("✗ skill.lead_scorer"));
        assert!(rendered.ends_with("  Error: boom"));
    }

    #[test]
    fn test_otlp_exporter_fails_soft() {
        let exporter = OtlpExporter::new(Some("http://localhost:4317".into()));
        exporter.export(&span(SpanStatus::Ok, None), 0);
        exporter.export(&span(SpanStatus::Error, Some("x")), 0);
        assert_eq!(exporter.endpoint(), Some("http://localhost:4317"));
    }

    #[test]
    fn test_config_defaults() {
        let config = TracerConfig::default();
        assert_eq!(config.provider, TracerProvider::Console);
        assert_eq!(config.service_name, "skill-eval");
        assert!(config.endpoint.is_none());
    }
}
