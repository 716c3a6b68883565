//! Shared collector, engine and tracer under a caller-managed worker pool.

use std::sync::Arc;

use serde_json::{json, Value};
use skill_eval_core::{
    DecisionConfig, DecisionEngine, InstrumentedExecutor, MetricsCollector, SchemaValidator,
    SkillDefinition, SkillTracer, TracerConfig, TracerProvider,
};

const WORKERS: usize = 8;
const RUNS_PER_WORKER: usize = 25;

fn shared_executor() -> InstrumentedExecutor {
    let validator = SchemaValidator::in_memory();
    for id in ["alpha", "beta"] {
        validator.register(
            SkillDefinition::new(id, "1.0.0")
                .with_input_schema(json!({"type": "object", "required": ["n"]}))
                .with_output_schema(json!({"type": "object", "required": ["n"]})),
            None,
        );
    }
    InstrumentedExecutor::new(
        Arc::new(validator),
        Arc::new(SkillTracer::new(TracerConfig::with_provider(
            TracerProvider::None,
        ))),
        Arc::new(MetricsCollector::new()),
        Arc::new(DecisionEngine::new(DecisionConfig::default()).unwrap()),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_workers_lose_no_updates() {
    let exec = shared_executor();

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let exec = exec.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let skill = if worker % 2 == 0 { "alpha" } else { "beta" };
            for n in 0..RUNS_PER_WORKER {
                exec.execute_skill(
                    skill,
                    "1.0.0",
                    &json!({"n": n}),
                    |inputs: &Value| Ok::<_, String>(inputs.clone()),
                    None,
                    None,
                );
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = WORKERS * RUNS_PER_WORKER;
    assert_eq!(exec.metrics().total_records(), total);
    let per_skill = total / 2;
    for skill in ["alpha", "beta"] {
        let metrics = exec.metrics().get_aggregated_metrics(skill).unwrap();
        assert_eq!(metrics.total_executions, per_skill);
        assert_eq!(metrics.success_rate, 1.0);
        let history = exec.engine().get_execution_history(skill).unwrap();
        assert_eq!(history.total_executions, per_skill as u64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_spans_stay_roots() {
    let exec = shared_executor();

    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let exec = exec.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            for n in 0..RUNS_PER_WORKER {
                exec.execute_skill(
                    "alpha",
                    "1.0.0",
                    &json!({"n": n}),
                    |inputs: &Value| {
                        std::thread::yield_now();
                        Ok::<_, String>(inputs.clone())
                    },
                    None,
                    None,
                );
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let spans = exec.tracer().get_spans();
    assert_eq!(spans.len(), WORKERS * RUNS_PER_WORKER);
    assert!(spans.iter().all(|s| s.is_root()));
    assert_eq!(exec.tracer().active_span_count(), 0);

    let mut trace_ids: Vec<&str> = spans.iter().map(|s| s.trace_id.as_str()).collect();
    trace_ids.sort_unstable();
    trace_ids.dedup();
    assert_eq!(trace_ids.len(), spans.len());
}
