//! Span records.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Final status of a span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Ok,
    Error,
}

impl SpanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One traced region. `end_time` and `duration_ms` stay `None` while open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanContext {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub attributes: BTreeMap<String, Value>,
    pub status: SpanStatus,
    pub error_message: Option<String>,
}

impl SpanContext {
    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Stamp the end from a monotonic elapsed time so `end_time >= start_time`
    /// holds even if the wall clock moves backwards.
    pub(crate) fn seal(&mut self, elapsed: Duration) {
        let delta = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.end_time = Some(self.start_time + delta);
        self.duration_ms = Some(elapsed.as_secs_f64() * 1000.0);
    }
}

/// Identity of an open span, used to parent spans explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRef {
    pub span_id: String,
    pub trace_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_sets_end_and_duration() {
        let mut span = SpanContext {
            span_id: "a".into(),
            trace_id: "t".into(),
            name: "skill.x".into(),
            start_time: Utc::now(),
            ..Default::default()
        };
        assert!(!span.is_closed());
        span.seal(Duration::from_millis(12));
        assert!(span.is_closed());
        assert!(span.end_time.unwrap() >= span.start_time);
        assert!((span.duration_ms.unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_export_keys_are_camel_case() {
        let span = SpanContext {
            span_id: "a".into(),
            trace_id: "t".into(),
            name: "skill.x".into(),
            start_time: Utc::now(),
            ..Default::default()
        };
        let raw = serde_json::to_value(&span).unwrap();
        for key in [
            "spanId",
            "traceId",
            "parentSpanId",
            "name",
            "startTime",
            "endTime",
            "durationMs",
            "attributes",
            "status",
            "errorMessage",
        ] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
        assert_eq!(raw["status"], "ok");
    }
}
