//! Span log and latency percentile invariants.

use serde_json::json;
use skill_eval_core::metrics::percentile;
use skill_eval_core::{
    DecisionType, ExecutionRecord, MetricsCollector, SkillTracer, SpanContext, SpanStatus,
    TracerConfig, TracerProvider,
};

fn tracer() -> SkillTracer {
    SkillTracer::new(TracerConfig::with_provider(TracerProvider::None))
}

/// Opens a small tree: workflow -> (a -> (b), c), with `b` failing.
fn open_tree(tracer: &SkillTracer) -> usize {
    let _wf = tracer.trace_workflow_execution("wf", "1.0.0");
    {
        let _a = tracer.trace_skill_execution("a", "1", &json!({}));
        let b = tracer.trace_skill_execution("b", "1", &json!({"x": 1}));
        let _: Result<(), &str> = b.run(|_| Err("b failed"));
    }
    {
        let mut c = tracer.trace_skill_execution("c", "1", &json!({}));
        c.set_attribute("rows", 3);
    }
    4
}

#[test]
fn every_opened_span_closes_exactly_once() {
    let tracer = tracer();
    let opened = open_tree(&tracer);

    let spans = tracer.get_spans();
    assert_eq!(spans.len(), opened);
    assert_eq!(tracer.active_span_count(), 0);

    let mut ids: Vec<&str> = spans.iter().map(|s| s.span_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), opened);

    for span in &spans {
        let end = span.end_time.expect("closed spans have an end time");
        assert!(end >= span.start_time);
        assert!(span.duration_ms.unwrap() >= 0.0);
        assert!(matches!(span.status, SpanStatus::Ok | SpanStatus::Error));
    }
    let failed: Vec<&SpanContext> = spans.iter().filter(|s| s.status == SpanStatus::Error).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "skill.b");
}

#[test]
fn nested_spans_link_to_their_enclosing_span() {
    let tracer = tracer();
    open_tree(&tracer);
    let spans = tracer.get_spans();
    let by_name = |name: &str| spans.iter().find(|s| s.name == name).unwrap();

    let wf = by_name("workflow.wf");
    let a = by_name("skill.a");
    let b = by_name("skill.b");
    let c = by_name("skill.c");

    assert!(wf.is_root());
    assert_eq!(a.parent_span_id.as_deref(), Some(wf.span_id.as_str()));
    assert_eq!(b.parent_span_id.as_deref(), Some(a.span_id.as_str()));
    assert_eq!(c.parent_span_id.as_deref(), Some(wf.span_id.as_str()));
    for s in [a, b, c] {
        assert_eq!(s.trace_id, wf.trace_id);
    }
    assert_eq!(c.attributes["rows"], 3);
}

#[test]
fn exported_json_uses_wire_field_names() {
    let tracer = tracer();
    open_tree(&tracer);
    let exported: serde_json::Value = serde_json::from_str(&tracer.export_json().unwrap()).unwrap();
    let first = &exported.as_array().unwrap()[0];
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
        assert!(first.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn latency_percentiles_are_ordered() {
    let samples: Vec<Vec<f64>> = vec![
        vec![5.0],
        vec![2.0, 1.0],
        vec![3.0, 3.0, 3.0],
        (1..=100).map(f64::from).rev().collect(),
        vec![0.1, 900.0, 12.5, 12.5, 3.3, 47.0, 0.0],
        (0..37).map(|i| f64::from(i * i % 17) + 0.25).collect(),
    ];

    for durations in samples {
        let collector = MetricsCollector::new();
        for d in &durations {
            collector.record_execution(ExecutionRecord::new(
                "s",
                "1",
                *d,
                true,
                true,
                DecisionType::AutoAct,
            ));
        }
        let l = collector.get_aggregated_metrics("s").unwrap().latency;
        assert!(l.p50 <= l.p95, "{durations:?}");
        assert!(l.p95 <= l.p99, "{durations:?}");
        assert!(l.p99 <= l.max, "{durations:?}");
        assert!(l.min <= l.avg && l.avg <= l.max, "{durations:?}");
    }
}

#[test]
fn percentile_of_one_sample_is_that_sample_and_of_none_is_none() {
    for p in [0.0, 0.5, 0.95, 0.99, 1.0] {
        assert_eq!(percentile(&[42.0], p), Some(42.0));
    }
    assert_eq!(percentile(&[], 0.5), None);
}
