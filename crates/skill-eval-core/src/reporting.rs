use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::metrics::{AggregatedMetrics, ExecutionRecord};
use crate::session::EvalSessionResult;

/// Per-skill evaluation report written for dashboards and CI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkillReport {
    pub skill_id: String,
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub summary: AggregatedMetrics,
    pub records: Vec<ExecutionRecord>,
}

/// Writes machine-readable evaluation reports under one output directory.
#[derive(Debug, Clone)]
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new("reports/evals")
    }
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn generate_skill_report(
        &self,
        metrics: &AggregatedMetrics,
        records: &[ExecutionRecord],
        session_id: &str,
    ) -> SkillReport {
        SkillReport {
            skill_id: metrics.skill_id.clone(),
            session_id: session_id.to_string(),
            generated_at: Utc::now(),
            summary: metrics.rounded(),
            records: records.to_vec(),
        }
    }

    /// Write `<out>/skills/<skill_id>_eval.json`.
    pub fn save_skill_report(
        &self,
        metrics: &AggregatedMetrics,
        records: &[ExecutionRecord],
        session_id: &str,
    ) -> Result<PathBuf> {
        let report = self.generate_skill_report(metrics, records, session_id);
        let path = self
            .output_dir
            .join("skills")
            .join(format!("{}_eval.json", report.skill_id));
        write_json(&path, &report)?;
        Ok(path)
    }

    /// Write `<out>/sessions/<session_id>_eval.json`.
    pub fn save_session_report(&self, session: &EvalSessionResult) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join("sessions")
            .join(format!("{}_eval.json", session.session_id));
        write_json(&path, session)?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(value).context("serialize report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionType;

    #[test]
    fn test_save_skill_report_layout() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            ExecutionRecord::new("lead_scorer", "1.0.0", 12.346, true, true, DecisionType::AutoAct),
            ExecutionRecord::new("lead_scorer", "1.0.0", 8.0, false, true, DecisionType::FlagForReview),
        ];
        let metrics = AggregatedMetrics::from_records("lead_scorer", &records).unwrap();
        let reporter = JsonReporter::new(dir.path());

        let path = reporter
            .save_skill_report(&metrics, &records, "session-1")
            .unwrap();
        assert_eq!(path, dir.path().join("skills").join("lead_scorer_eval.json"));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["sessionId"], "session-1");
        assert_eq!(raw["summary"]["totalExecutions"], 2);
        assert_eq!(raw["records"].as_array().unwrap().len(), 2);
        assert_eq!(raw["summary"]["latency"]["max"], 12.35);
    }
}
