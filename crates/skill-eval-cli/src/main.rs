//! Skill Eval - evaluation and decision harness CLI
//!
//! The `skill-eval` command inspects a skills library the way the harness
//! would at execution time, without running any skill logic.
//!
//! ## Commands
//!
//! - `validate`: Validate an input and/or output payload against a skill
//! - `chain`: Check that one skill's outputs can feed another's inputs
//! - `risk`: Evaluate static and runtime-adjusted risk
//! - `decide`: Pre-flight a decision (validate, risk, confidence, verdict)
//! - `summarize`: Summarise an exported trace file
//! - `generate`: Write schema-driven test data for one or more skills
//! - `config`: Print the effective harness configuration

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, Level};

use skill_eval_core::{
    DecisionEngine, ExecutionContext, HarnessConfig, InstrumentedExecutor, MetricsCollector,
    RiskEvaluator, RuntimeRiskFactors, SchemaValidator, SkillTracer, SpanContext, SpanStatus,
    TestDataGenerator, TracerProvider, TracerConfig,
};

#[derive(Parser)]
#[command(name = "skill-eval")]
#[command(version = skill_eval_core::VERSION)]
#[command(about = "Skill evaluation and decision harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and command output
    #[arg(long, global = true)]
    json: bool,

    /// Skills library root
    #[arg(long, global = true, env = "SKILL_EVAL_LIBRARY")]
    library: Option<PathBuf>,

    /// Harness configuration file (TOML)
    #[arg(long, global = true, env = "SKILL_EVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Span exporter: console, otlp or none
    #[arg(long, global = true, env = "SKILL_EVAL_TRACE_PROVIDER")]
    trace_provider: Option<TracerProvider>,

    /// Remote collector endpoint for the otlp provider
    #[arg(long, global = true, env = "SKILL_EVAL_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate payloads against a skill's input/output schema
    Validate {
        /// Skill id
        #[arg(short, long)]
        skill: String,

        /// Input payload (JSON file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output payload (JSON file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check chain compatibility between two skills
    Chain {
        /// Producing skill id
        #[arg(long)]
        producer: String,

        /// Consuming skill id
        #[arg(long)]
        consumer: String,

        /// Field mapping `output.field=input.field` (repeatable)
        #[arg(long = "map", value_parser = parse_mapping)]
        mappings: Vec<(String, String)>,
    },

    /// Evaluate a skill's risk level
    Risk {
        /// Skill id
        #[arg(short, long)]
        skill: String,

        #[command(flatten)]
        factors: FactorArgs,
    },

    /// Pre-flight a decision without executing the skill
    Decide {
        /// Skill id
        #[arg(short, long)]
        skill: String,

        /// Input payload (JSON file)
        #[arg(short, long)]
        input: PathBuf,

        /// Execution context (JSON file)
        #[arg(short, long)]
        context: Option<PathBuf>,

        #[command(flatten)]
        factors: FactorArgs,
    },

    /// Summarise a trace export (JSON array of spans)
    Summarize {
        /// Trace file written by the tracer's JSON export
        #[arg(long)]
        traces: PathBuf,
    },

    /// Generate test data from skills' input schemas
    Generate {
        /// Skill id (repeatable)
        #[arg(short, long = "skill", required = true)]
        skills: Vec<String>,

        /// Valid cases per skill, before edge cases
        #[arg(short = 'n', long, default_value_t = 3)]
        cases: usize,

        /// Generator seed; the same seed reproduces the same data
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Directory for `<skill>_test_data.json` files
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Runtime risk factors.
#[derive(Args, Debug, Clone, Copy, Default)]
struct FactorArgs {
    /// Execution calls external APIs
    #[arg(long)]
    external_api: bool,

    /// Execution modifies data
    #[arg(long)]
    modifies_data: bool,

    /// Execution moves money
    #[arg(long)]
    financial: bool,

    /// Execution reads personal data
    #[arg(long)]
    pii: bool,

    /// Execution touches the host system
    #[arg(long)]
    system_level: bool,
}

impl FactorArgs {
    /// `None` when no factor flag was given.
    fn to_factors(self) -> Option<RuntimeRiskFactors> {
        let factors = RuntimeRiskFactors {
            has_external_api_calls: self.external_api,
            modifies_data: self.modifies_data,
            financial_operation: self.financial,
            accesses_pii: self.pii,
            system_level_operation: self.system_level,
        };
        (factors != RuntimeRiskFactors::default()).then_some(factors)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = effective_config(&cli)?;

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level()?
    };
    skill_eval_core::init_tracing(cli.json || config.logging.json, level);
    debug!(?config, "effective configuration");

    let out = Output { json: cli.json };
    match cli.command {
        Commands::Validate {
            skill,
            input,
            output,
        } => cmd_validate(&out, &config, &skill, input.as_deref(), output.as_deref()),
        Commands::Chain {
            producer,
            consumer,
            mappings,
        } => cmd_chain(&out, &config, &producer, &consumer, &mappings),
        Commands::Risk { skill, factors } => cmd_risk(&out, &config, &skill, factors.to_factors()),
        Commands::Decide {
            skill,
            input,
            context,
            factors,
        } => cmd_decide(
            &out,
            &config,
            &skill,
            &input,
            context.as_deref(),
            factors.to_factors(),
        ),
        Commands::Summarize { traces } => cmd_summarize(&out, &traces),
        Commands::Generate {
            skills,
            cases,
            seed,
            output_dir,
        } => cmd_generate(&out, &config, &skills, cases, seed, &output_dir),
        Commands::Config => out.emit(&config, || format!("{config:#?}")),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Config file (if any) overlaid with command-line and environment values.
fn effective_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    if let Some(library) = &cli.library {
        config.library_path = Some(library.clone());
    }
    if let Some(provider) = cli.trace_provider {
        config.tracer.provider = provider;
    }
    if let Some(endpoint) = &cli.otlp_endpoint {
        config.tracer.endpoint = Some(endpoint.clone());
    }
    Ok(config)
}

fn open_validator(config: &HarnessConfig) -> Result<SchemaValidator> {
    let root = config
        .library_path
        .as_ref()
        .context("no skills library configured (pass --library or set SKILL_EVAL_LIBRARY)")?;
    SchemaValidator::new(root).with_context(|| format!("open skills library {}", root.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn parse_mapping(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(format!("expected output.field=input.field, got '{raw}'")),
    }
}

/// Human or JSON rendering of command results.
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_validate(
    out: &Output,
    config: &HarnessConfig,
    skill: &str,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    if input.is_none() && output.is_none() {
        bail!("nothing to validate: pass --input and/or --output");
    }
    let validator = open_validator(config)?;

    let mut results = BTreeMap::new();
    if let Some(path) = input {
        results.insert("input", validator.validate_input(skill, &read_json(path)?));
    }
    if let Some(path) = output {
        results.insert("output", validator.validate_output(skill, &read_json(path)?));
    }

    out.emit(&results, || {
        results
            .iter()
            .map(|(stage, result)| format!("{skill} {stage}: {result}"))
            .collect::<Vec<_>>()
            .join("\n")
    })?;

    if results.values().any(|r| !r.is_valid()) {
        bail!("validation failed for {skill}");
    }
    Ok(())
}

fn cmd_chain(
    out: &Output,
    config: &HarnessConfig,
    producer: &str,
    consumer: &str,
    mappings: &[(String, String)],
) -> Result<()> {
    let validator = open_validator(config)?;
    let mappings: Option<BTreeMap<String, String>> =
        (!mappings.is_empty()).then(|| mappings.iter().cloned().collect());
    let result = validator.validate_chain_compatibility(producer, consumer, mappings.as_ref());

    out.emit(&result, || format!("{producer} -> {consumer}: {result}"))?;
    if !result.is_valid() {
        bail!("{producer} cannot feed {consumer}");
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RiskReport {
    skill_id: String,
    declaration: String,
    assessment: skill_eval_core::RiskAssessment,
    requires_approval_at_full_confidence: bool,
    mitigations: Vec<String>,
}

fn cmd_risk(
    out: &Output,
    config: &HarnessConfig,
    skill: &str,
    factors: Option<RuntimeRiskFactors>,
) -> Result<()> {
    let validator = open_validator(config)?;
    let evaluator = RiskEvaluator::new();
    let assessment = evaluator.evaluate_risk(validator.get_risk_level(skill), factors.as_ref());
    let report = RiskReport {
        skill_id: skill.to_string(),
        declaration: format!("{:?}", validator.risk_declaration(skill)),
        requires_approval_at_full_confidence: evaluator
            .should_require_approval(assessment.risk_level, 1.0),
        mitigations: evaluator.get_mitigation_recommendations(assessment.risk_level, factors.as_ref()),
        assessment,
    };

    out.emit(&report, || {
        let a = &report.assessment;
        let mut text = format!(
            "{}: {} (static {}, +{})\n  declared: {}\n  monitoring: {}  audit logging: {}",
            report.skill_id,
            a.risk_level,
            a.static_risk,
            a.risk_adjustment,
            report.declaration,
            a.requires_monitoring,
            a.requires_audit_logging,
        );
        for m in &report.mitigations {
            text.push_str(&format!("\n  - {m}"));
        }
        text
    })
}

fn cmd_decide(
    out: &Output,
    config: &HarnessConfig,
    skill: &str,
    input: &Path,
    context: Option<&Path>,
    factors: Option<RuntimeRiskFactors>,
) -> Result<()> {
    let executor = InstrumentedExecutor::new(
        Arc::new(open_validator(config)?),
        Arc::new(SkillTracer::new(TracerConfig {
            provider: TracerProvider::None,
            ..config.tracer.clone()
        })),
        Arc::new(MetricsCollector::new()),
        Arc::new(DecisionEngine::new(config.decision.clone()).context("invalid decision thresholds")?),
    );
    let inputs = read_json(input)?;
    let context: Option<ExecutionContext> = match context {
        Some(path) => Some(
            serde_json::from_value(read_json(path)?)
                .with_context(|| format!("parse context {}", path.display()))?,
        ),
        None => None,
    };

    let pre = executor.preflight(skill, &inputs, context.as_ref(), factors.as_ref());
    out.emit(&pre, || {
        format!(
            "{skill}: {}\n  {}\n  confidence: {:.3}  risk: {}\n  input: {}",
            pre.decision.decision_type,
            pre.decision.reasoning,
            pre.confidence,
            pre.risk.risk_level,
            pre.input_validation,
        )
    })
}

/// Aggregate view of a span export.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct TraceSummary {
    spans: usize,
    traces: usize,
    roots: usize,
    errors: usize,
    total_duration_ms: f64,
    /// `name: message` for each error span.
    failures: Vec<String>,
}

fn summarize_spans(spans: &[SpanContext]) -> TraceSummary {
    let traces: BTreeSet<&str> = spans.iter().map(|s| s.trace_id.as_str()).collect();
    let failures: Vec<String> = spans
        .iter()
        .filter(|s| s.status == SpanStatus::Error)
        .map(|s| format!("{}: {}", s.name, s.error_message.as_deref().unwrap_or("(no message)")))
        .collect();
    TraceSummary {
        spans: spans.len(),
        traces: traces.len(),
        roots: spans.iter().filter(|s| s.is_root()).count(),
        errors: failures.len(),
        total_duration_ms: spans
            .iter()
            .filter(|s| s.is_root())
            .filter_map(|s| s.duration_ms)
            .sum(),
        failures,
    }
}

fn cmd_summarize(out: &Output, traces: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(traces)
        .with_context(|| format!("read {}", traces.display()))?;
    let spans: Vec<SpanContext> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", traces.display()))?;
    let summary = summarize_spans(&spans);

    out.emit(&summary, || {
        let mut text = format!(
            "{} spans in {} traces ({} roots), {} errors, {:.2}ms in root spans",
            summary.spans, summary.traces, summary.roots, summary.errors, summary.total_duration_ms
        );
        for f in &summary.failures {
            text.push_str(&format!("\n  ✗ {f}"));
        }
        text
    })
}

fn cmd_generate(
    out: &Output,
    config: &HarnessConfig,
    skills: &[String],
    cases: usize,
    seed: u64,
    output_dir: &Path,
) -> Result<()> {
    let validator = open_validator(config)?;
    let ids: Vec<&str> = skills.iter().map(String::as_str).collect();
    let batch =
        TestDataGenerator::new(seed).generate_batch(&validator, &ids, cases, Some(output_dir));
    let counts: BTreeMap<&String, usize> =
        batch.iter().map(|(id, cases)| (id, cases.len())).collect();

    out.emit(&counts, || {
        counts
            .iter()
            .map(|(id, n)| {
                let path = output_dir.join(format!("{id}_test_data.json"));
                format!("{id}: {n} cases -> {}", path.display())
            })
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    if let Some((id, _)) = counts.iter().find(|(_, n)| **n == 0) {
        bail!("no test data generated for {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn library() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("sales").join("lead_scorer");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("skill.json"),
            json!({
                "id": "lead_scorer",
                "version": "1.0.0",
                "inputSchema": {
                    "type": "object",
                    "required": ["company"],
                    "properties": {"company": {"type": "string"}}
                },
                "outputSchema": {
                    "type": "object",
                    "required": ["score"],
                    "properties": {"score": {"type": "number"}}
                }
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(skill_dir.join("metadata.yaml"), "security:\n  risk_level: High\n").unwrap();
        dir
    }

    fn config_for(dir: &Path) -> HarnessConfig {
        HarnessConfig {
            library_path: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    fn write(dir: &Path, name: &str, value: Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_parse_global_flags_and_mappings() {
        let cli = Cli::try_parse_from([
            "skill-eval",
            "--library",
            "/skills",
            "--trace-provider",
            "otlp",
            "chain",
            "--producer",
            "a",
            "--consumer",
            "b",
            "--map",
            "output.x=input.y",
            "--map",
            "output.z = input.w",
        ])
        .unwrap();
        assert_eq!(cli.library, Some(PathBuf::from("/skills")));
        assert_eq!(cli.trace_provider, Some(TracerProvider::Otlp));
        match cli.command {
            Commands::Chain { mappings, .. } => assert_eq!(
                mappings,
                vec![
                    ("output.x".to_string(), "input.y".to_string()),
                    ("output.z".to_string(), "input.w".to_string()),
                ]
            ),
            _ => panic!("expected chain"),
        }
    }

    #[test]
    fn test_rejects_bad_mapping_and_provider() {
        assert!(Cli::try_parse_from([
            "skill-eval", "chain", "--producer", "a", "--consumer", "b", "--map", "nope",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["skill-eval", "--trace-provider", "jaeger", "config"]).is_err());
    }

    #[test]
    fn test_factor_flags() {
        let cli = Cli::try_parse_from(["skill-eval", "risk", "-s", "x", "--financial", "--pii"]).unwrap();
        match cli.command {
            Commands::Risk { factors, .. } => {
                let f = factors.to_factors().unwrap();
                assert!(f.financial_operation && f.accesses_pii);
                assert!(!f.modifies_data);
            }
            _ => panic!("expected risk"),
        }
        assert!(FactorArgs::default().to_factors().is_none());
    }

    #[test]
    fn test_effective_config_overlays_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skill-eval.toml");
        std::fs::write(&path, "library_path = \"from-file\"\n[tracer]\nprovider = \"none\"\n").unwrap();
        let cli = Cli::try_parse_from([
            "skill-eval",
            "--config",
            path.to_str().unwrap(),
            "--otlp-endpoint",
            "http://collector:4317",
            "config",
        ])
        .unwrap();
        let config = effective_config(&cli).unwrap();
        assert_eq!(config.library_path, Some(PathBuf::from("from-file")));
        assert_eq!(config.tracer.provider, TracerProvider::None);
        assert_eq!(config.tracer.endpoint.as_deref(), Some("http://collector:4317"));
    }

    #[test]
    fn test_cmd_validate_pass_and_fail() {
        let lib = library();
        let config = config_for(lib.path());
        let out = Output { json: true };
        let good = write(lib.path(), "good.json", json!({"company": "Acme"}));
        let bad = write(lib.path(), "bad.json", json!({"score": "high"}));

        assert!(cmd_validate(&out, &config, "lead_scorer", Some(&good), None).is_ok());
        assert!(cmd_validate(&out, &config, "lead_scorer", Some(&good), Some(&bad)).is_err());
        assert!(cmd_validate(&out, &config, "lead_scorer", None, None).is_err());
    }

    #[test]
    fn test_commands_need_a_library() {
        let out = Output { json: false };
        let err = cmd_risk(&out, &HarnessConfig::default(), "x", None).unwrap_err();
        assert!(err.to_string().contains("no skills library configured"));
    }

    #[test]
    fn test_cmd_risk_and_decide() {
        let lib = library();
        let config = config_for(lib.path());
        let out = Output { json: false };
        assert!(cmd_risk(&out, &config, "lead_scorer", None).is_ok());

        let input = write(lib.path(), "in.json", json!({"company": "Acme"}));
        let context = write(lib.path(), "ctx.json", json!({"user_id": "u-1"}));
        assert!(cmd_decide(&out, &config, "lead_scorer", &input, Some(&context), None).is_ok());
    }

    #[test]
    fn test_cmd_generate_writes_files() {
        let lib = library();
        let config = config_for(lib.path());
        let out_dir = lib.path().join("generated");
        let cli = Cli::try_parse_from([
            "skill-eval",
            "generate",
            "-s",
            "lead_scorer",
            "-n",
            "2",
            "-o",
            out_dir.to_str().unwrap(),
        ])
        .unwrap();
        let Commands::Generate { skills, cases, seed, output_dir } = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(seed, 0);
        cmd_generate(&Output { json: true }, &config, &skills, cases, seed, &output_dir).unwrap();

        let written =
            skill_eval_core::load_test_cases(&out_dir.join("lead_scorer_test_data.json")).unwrap();
        // two valid, missing_company, invalid_type_company, empty_object
        assert_eq!(written.len(), 5);
        let validator = open_validator(&config).unwrap();
        for case in &written {
            assert_eq!(
                validator.validate_input("lead_scorer", &case.inputs).is_valid(),
                case.expected_valid,
                "{}",
                case.label
            );
        }

        let missing = vec!["ghost".to_string()];
        assert!(cmd_generate(&Output { json: false }, &config, &missing, 1, 0, &out_dir).is_err());
    }

    #[test]
    fn test_summarize_spans() {
        let tracer = SkillTracer::new(TracerConfig {
            provider: TracerProvider::None,
            ..Default::default()
        });
        {
            let _root = tracer.trace_workflow_execution("wf", "1");
            let mut child = tracer.trace_skill_execution("a", "1", &json!({}));
            child.set_status(SpanStatus::Error, Some("boom"));
        }
        drop(tracer.trace_skill_execution("b", "1", &json!({})));

        let summary = summarize_spans(&tracer.get_spans());
        assert_eq!(summary.spans, 3);
        assert_eq!(summary.traces, 2);
        assert_eq!(summary.roots, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failures, vec!["skill.a: boom".to_string()]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.json");
        std::fs::write(&path, tracer.export_json().unwrap()).unwrap();
        assert!(cmd_summarize(&Output { json: true }, &path).is_ok());
    }
}
