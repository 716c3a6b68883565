//! Evaluation sessions: batch validation, tracing and metrics for a set of
//! skills, persisted as integrity-checked artifacts.
//!
//! [`EvalSession::save_results`] writes three files to the output dir:
//!
//! - `<session_id>.json`: the [`EvalSessionResult`] without traces
//! - `<session_id>.traces.json`: the closed-span log
//! - `<session_id>.digest`: SHA-256 hex over the two files above, in order
//!
//! [`read_session_results`] recomputes the digest before trusting either.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::decision::DecisionEngine;
use crate::domain::{HarnessError, Result};
use crate::executor::InstrumentedExecutor;
use crate::metrics::{AggregatedMetrics, MetricsCollector};
use crate::testdata::load_test_cases;
use crate::tracer::{SkillTracer, SpanContext, TracerConfig, TracerProvider};
use crate::validation::{SchemaValidator, ValidationResult};

/// Session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    pub session_id: String,
    pub session_name: String,
    pub skills_to_eval: Vec<String>,
    /// skill id -> test data file.
    #[serde(default)]
    pub test_data_paths: BTreeMap<String, PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default = "enabled")]
    pub tracing_enabled: bool,
    #[serde(default = "enabled")]
    pub validation_enabled: bool,
    #[serde(default = "enabled")]
    pub metrics_enabled: bool,
    #[serde(default)]
    pub trace_provider: TracerProvider,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn enabled() -> bool {
    true
}

impl EvalConfig {
    /// Config with a fresh session id and every switch on.
    pub fn new(session_name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            session_name: session_name.into(),
            skills_to_eval: Vec::new(),
            test_data_paths: BTreeMap::new(),
            output_dir: output_dir.into(),
            tracing_enabled: true,
            validation_enabled: true,
            metrics_enabled: true,
            trace_provider: TracerProvider::Console,
            otlp_endpoint: None,
        }
    }

    pub fn with_skills<S: Into<String>>(mut self, skills: impl IntoIterator<Item = S>) -> Self {
        self.skills_to_eval = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Tracer settings implied by this config; tracing off means no export.
    pub fn tracer_config(&self) -> TracerConfig {
        TracerConfig {
            provider: if self.tracing_enabled {
                self.trace_provider
            } else {
                TracerProvider::None
            },
            endpoint: self.otlp_endpoint.clone(),
            ..TracerConfig::default()
        }
    }
}

/// Execution-weighted totals for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_skills: usize,
    pub total_executions: usize,
    pub overall_success_rate: f64,
    pub overall_validation_pass_rate: f64,
}

/// Outcome of replaying one skill's test data file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestDataSummary {
    pub cases: usize,
    /// Executions that produced a valid output.
    pub succeeded: usize,
    /// Labels of cases whose input validity differed from `expected_valid`.
    pub unexpected: Vec<String>,
}

/// Everything a finished session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSessionResult {
    pub session_id: String,
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub skills_evaluated: Vec<String>,
    pub metrics: BTreeMap<String, AggregatedMetrics>,
    pub validation_results: BTreeMap<String, Vec<ValidationResult>>,
    pub summary: SessionSummary,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub test_data: BTreeMap<String, TestDataSummary>,
    /// Stored in the companion traces file, not inline.
    #[serde(skip)]
    pub traces: Vec<SpanContext>,
}

/// Paths written by [`EvalSession::save_results`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSession {
    pub results_path: PathBuf,
    pub traces_path: PathBuf,
    pub digest_path: PathBuf,
    pub digest: String,
}

pub struct EvalSession {
    config: EvalConfig,
    validator: Arc<SchemaValidator>,
    tracer: Arc<SkillTracer>,
    metrics: Arc<MetricsCollector>,
    started_at: Option<DateTime<Utc>>,
    validations: Mutex<BTreeMap<String, Vec<ValidationResult>>>,
    test_data: Mutex<BTreeMap<String, TestDataSummary>>,
}

impl std::fmt::Debug for EvalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalSession")
            .field("config", &self.config)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl EvalSession {
    /// Session with its own tracer and collector.
    pub fn new(config: EvalConfig, validator: Arc<SchemaValidator>) -> Self {
        let tracer = Arc::new(SkillTracer::new(config.tracer_config()));
        Self::with_collaborators(config, validator, tracer, Arc::new(MetricsCollector::new()))
    }

    pub fn with_collaborators(
        config: EvalConfig,
        validator: Arc<SchemaValidator>,
        tracer: Arc<SkillTracer>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            validator,
            tracer,
            metrics,
            started_at: None,
            validations: Mutex::new(BTreeMap::new()),
            test_data: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn tracer(&self) -> &Arc<SkillTracer> {
        &self.tracer
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// An executor feeding this session's tracer and collector.
    pub fn executor(&self, engine: Arc<DecisionEngine>) -> InstrumentedExecutor {
        InstrumentedExecutor::new(
            Arc::clone(&self.validator),
            Arc::clone(&self.tracer),
            Arc::clone(&self.metrics),
            engine,
        )
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        info!(
            event = "session.started",
            session_id = %self.config.session_id,
            session_name = %self.config.session_name,
            skills = self.config.skills_to_eval.len(),
        );
    }

    /// Validate a recorded input/output pair and keep both results. With
    /// validation disabled both results are valid and nothing is kept.
    pub fn validate_and_record(
        &self,
        skill_id: &str,
        input: &Value,
        output: &Value,
    ) -> (ValidationResult, ValidationResult) {
        if !self.config.validation_enabled {
            return (ValidationResult::valid(), ValidationResult::valid());
        }
        let input_result = self.validator.validate_input(skill_id, input);
        let output_result = self.validator.validate_output(skill_id, output);
        self.lock_validations()
            .entry(skill_id.to_string())
            .or_default()
            .extend([input_result.clone(), output_result.clone()]);
        (input_result, output_result)
    }

    /// Run every case in `test_data_paths` through an instrumented executor,
    /// calling `logic` with the skill id and case inputs. Input validations
    /// are kept as with [`Self::validate_and_record`]; the per-skill summary
    /// is returned and included in [`Self::end`].
    pub fn run_test_data<F, E>(
        &self,
        engine: Arc<DecisionEngine>,
        mut logic: F,
    ) -> Result<BTreeMap<String, TestDataSummary>>
    where
        F: FnMut(&str, &Value) -> std::result::Result<Value, E>,
        E: Display,
    {
        let executor = self.executor(engine);
        let mut summaries = BTreeMap::new();

        for (skill_id, path) in &self.config.test_data_paths {
            let cases = load_test_cases(path)?;
            let version = self
                .validator
                .definition(skill_id)
                .map_or_else(|| "unknown".to_string(), |d| d.version.clone());

            let mut summary = TestDataSummary::default();
            for case in cases {
                let result = executor.execute_skill(
                    skill_id,
                    &version,
                    &case.inputs,
                    |inputs: &Value| logic(skill_id.as_str(), inputs),
                    None,
                    None,
                );
                summary.cases += 1;
                if result.success {
                    summary.succeeded += 1;
                }
                if result.input_validation.is_valid() != case.expected_valid {
                    summary.unexpected.push(case.label);
                }
                if self.config.validation_enabled {
                    self.lock_validations()
                        .entry(skill_id.clone())
                        .or_default()
                        .push(result.input_validation);
                }
            }

            info!(
                event = "session.test_data",
                session_id = %self.config.session_id,
                skill_id = %skill_id,
                cases = summary.cases,
                succeeded = summary.succeeded,
                unexpected = summary.unexpected.len(),
            );
            summaries.insert(skill_id.clone(), summary);
        }

        self.lock_test_data().extend(summaries.clone());
        Ok(summaries)
    }

    /// Snapshot the session. Can be called more than once.
    pub fn end(&self) -> EvalSessionResult {
        let end_time = Utc::now();
        let start_time = self.started_at.unwrap_or(end_time);
        let metrics = if self.config.metrics_enabled {
            self.metrics.get_all_metrics()
        } else {
            BTreeMap::new()
        };

        let total_executions: usize = metrics.values().map(|m| m.total_executions).sum();
        let weighted = |rate: fn(&AggregatedMetrics) -> f64| {
            if total_executions == 0 {
                0.0
            } else {
                metrics
                    .values()
                    .map(|m| rate(m) * m.total_executions as f64)
                    .sum::<f64>()
                    / total_executions as f64
            }
        };
        let summary = SessionSummary {
            total_skills: self.config.skills_to_eval.len(),
            total_executions,
            overall_success_rate: weighted(|m| m.success_rate),
            overall_validation_pass_rate: weighted(|m| m.validation_pass_rate),
        };

        let duration_seconds = (end_time - start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        info!(
            event = "session.finished",
            session_id = %self.config.session_id,
            duration_seconds,
            skills_evaluated = metrics.len(),
            total_executions,
            success_rate = summary.overall_success_rate,
        );

        EvalSessionResult {
            session_id: self.config.session_id.clone(),
            session_name: self.config.session_name.clone(),
            start_time,
            end_time,
            duration_seconds,
            skills_evaluated: metrics.keys().cloned().collect(),
            metrics,
            validation_results: self.lock_validations().clone(),
            summary,
            test_data: self.lock_test_data().clone(),
            traces: self.tracer.get_spans(),
        }
    }

    /// End the session and persist it under the configured output dir.
    pub fn save_results(&self) -> Result<SavedSession> {
        let result = self.end();
        write_session_results(&result, &self.config.output_dir)
    }

    fn lock_validations(&self) -> MutexGuard<'_, BTreeMap<String, Vec<ValidationResult>>> {
        self.validations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_test_data(&self) -> MutexGuard<'_, BTreeMap<String, TestDataSummary>> {
        self.test_data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Write `<dir>/<session_id>.json`, `.traces.json` and `.digest`.
pub fn write_session_results(result: &EvalSessionResult, dir: &Path) -> Result<SavedSession> {
    std::fs::create_dir_all(dir)?;
    let paths = session_paths(dir, &result.session_id);

    let results_json = serde_json::to_vec_pretty(result)?;
    let traces_json = serde_json::to_vec_pretty(&result.traces)?;
    let digest = session_digest(&results_json, &traces_json);

    std::fs::write(&paths.0, &results_json)?;
    std::fs::write(&paths.1, &traces_json)?;
    std::fs::write(&paths.2, digest.as_bytes())?;

    info!(
        event = "session.saved",
        session_id = %result.session_id,
        path = %paths.0.display(),
    );

    Ok(SavedSession {
        results_path: paths.0,
        traces_path: paths.1,
        digest_path: paths.2,
        digest,
    })
}

/// Read a saved session and verify it against its digest file.
///
/// Returns `HarnessError::DigestMismatch` if either file changed.
pub fn read_session_results(dir: &Path, session_id: &str) -> Result<EvalSessionResult> {
    let (results_path, traces_path, digest_path) = session_paths(dir, session_id);

    let results_json = std::fs::read(&results_path)?;
    let traces_json = std::fs::read(&traces_path)?;
    let expected = std::fs::read_to_string(&digest_path)?.trim().to_string();

    let actual = session_digest(&results_json, &traces_json);
    if actual != expected {
        return Err(HarnessError::DigestMismatch { expected, actual });
    }

    let mut result: EvalSessionResult = serde_json::from_slice(&results_json)?;
    result.traces = serde_json::from_slice(&traces_json)?;
    Ok(result)
}

fn session_paths(dir: &Path, session_id: &str) -> (PathBuf, PathBuf, PathBuf) {
    (
        dir.join(format!("{session_id}.json")),
        dir.join(format!("{session_id}.traces.json")),
        dir.join(format!("{session_id}.digest")),
    )
}

fn session_digest(results_json: &[u8], traces_json: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(results_json);
    hasher.update(traces_json);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SkillDefinition;
    use serde_json::json;
    use tempfile::tempdir;

    fn validator() -> Arc<SchemaValidator> {
        let validator = SchemaValidator::in_memory();
        validator.register(
            SkillDefinition::new("echo", "1.0.0")
                .with_input_schema(json!({"type": "object", "required": ["text"]}))
                .with_output_schema(json!({"type": "object", "required": ["text"]})),
            None,
        );
        Arc::new(validator)
    }

    fn config(dir: &Path) -> EvalConfig {
        let mut config = EvalConfig::new("nightly", dir).with_skills(["echo"]);
        config.trace_provider = TracerProvider::None;
        config
    }

    #[test]
    fn test_tracing_disabled_forces_no_export() {
        let mut config = EvalConfig::new("x", "/tmp");
        config.tracing_enabled = false;
        assert_eq!(config.tracer_config().provider, TracerProvider::None);
    }

    #[test]
    fn test_validate_and_record_keeps_results() {
        let dir = tempdir().unwrap();
        let session = EvalSession::new(config(dir.path()), validator());
        let (i, o) = session.validate_and_record("echo", &json!({"text": "hi"}), &json!({}));
        assert!(i.is_valid());
        assert!(!o.is_valid());

        let result = session.end();
        assert_eq!(result.validation_results["echo"].len(), 2);
        assert_eq!(result.summary.total_skills, 1);
        assert_eq!(result.summary.total_executions, 0);
        assert_eq!(result.summary.overall_success_rate, 0.0);
    }

    #[test]
    fn test_validation_disabled_short_circuits() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.validation_enabled = false;
        let session = EvalSession::new(cfg, validator());
        let (i, o) = session.validate_and_record("missing", &json!({}), &json!({}));
        assert!(i.is_valid() && o.is_valid());
        assert!(session.end().validation_results.is_empty());
    }

    #[test]
    fn test_run_test_data_replays_cases() {
        use crate::decision::DecisionConfig;
        use crate::testdata::{save_test_cases, TestCase};

        let dir = tempdir().unwrap();
        let cases = vec![
            TestCase {
                inputs: json!({"text": "hi"}),
                label: "valid_case_1".into(),
                expected_valid: true,
            },
            TestCase {
                inputs: json!({}),
                label: "missing_text".into(),
                expected_valid: false,
            },
            TestCase {
                inputs: json!({"other": 1}),
                label: "mislabelled".into(),
                expected_valid: true,
            },
        ];
        let path = dir.path().join("echo_test_data.json");
        save_test_cases("echo", &cases, &path).unwrap();

        let mut cfg = config(dir.path());
        cfg.test_data_paths.insert("echo".into(), path);
        let mut session = EvalSession::new(cfg, validator());
        session.start();

        let engine = Arc::new(DecisionEngine::new(DecisionConfig::default()).unwrap());
        let mut seen = Vec::new();
        let summaries = session
            .run_test_data(engine, |skill_id, inputs| {
                seen.push(skill_id.to_string());
                Ok::<_, String>(inputs.clone())
            })
            .unwrap();

        let echo = &summaries["echo"];
        assert_eq!(echo.cases, 3);
        assert_eq!(echo.succeeded, 1);
        assert_eq!(echo.unexpected, vec!["mislabelled".to_string()]);
        assert!(seen.iter().all(|s| s == "echo"));

        let result = session.end();
        assert_eq!(result.test_data["echo"], *echo);
        assert_eq!(result.validation_results["echo"].len(), 3);
        assert_eq!(result.metrics["echo"].total_executions, 3);
    }

    #[test]
    fn test_run_test_data_missing_file_errors() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.test_data_paths
            .insert("echo".into(), dir.path().join("absent.json"));
        let session = EvalSession::new(cfg, validator());
        let engine = Arc::new(DecisionEngine::new(Default::default()).unwrap());
        let err = session
            .run_test_data(engine, |_, inputs| Ok::<_, String>(inputs.clone()))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Io(_)));
    }

    #[test]
    fn test_save_then_read_roundtrip_and_tamper() {
        let dir = tempdir().unwrap();
        let mut session = EvalSession::new(config(dir.path()), validator());
        session.start();
        drop(session.tracer().trace_skill_execution("echo", "1.0.0", &json!({})));

        let saved = session.save_results().unwrap();
        assert!(saved.results_path.exists());
        assert!(saved.traces_path.ends_with(format!(
            "{}.traces.json",
            session.config().session_id
        )));
        assert_eq!(saved.digest.len(), 64);

        let read = read_session_results(dir.path(), &session.config().session_id).unwrap();
        assert_eq!(read.session_name, "nightly");
        assert_eq!(read.traces.len(), 1);

        std::fs::write(&saved.traces_path, b"[]").unwrap();
        assert!(matches!(
            read_session_results(dir.path(), &session.config().session_id),
            Err(HarnessError::DigestMismatch { .. })
        ));
    }
}
