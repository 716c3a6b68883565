//! In-process store of execution records, keyed by skill id.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::aggregate::{round_to, AggregatedMetrics};
use super::record::ExecutionRecord;
use crate::decision::DecisionType;

/// Rates across every tracked skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRates {
    pub success_rate: f64,
    pub validation_pass_rate: f64,
    pub auto_act_rate: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_executions: usize,
    pub skills_tracked: usize,
    /// Absent when nothing has been recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<OverallRates>,
    #[serde(default)]
    pub skills: BTreeMap<String, AggregatedMetrics>,
}

/// Thread-safe record store. Appends take one short lock on the whole map.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    records: Mutex<BTreeMap<String, Vec<ExecutionRecord>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&self, record: ExecutionRecord) {
        debug!(
            skill_id = %record.skill_id,
            success = record.success,
            decision = %record.decision_type,
            duration_ms = record.duration_ms,
            "execution recorded"
        );
        self.lock()
            .entry(record.skill_id.clone())
            .or_default()
            .push(record);
    }

    /// `None` when the skill has no records.
    pub fn get_aggregated_metrics(&self, skill_id: &str) -> Option<AggregatedMetrics> {
        let records = self.lock();
        AggregatedMetrics::from_records(skill_id, records.get(skill_id)?)
    }

    pub fn get_all_metrics(&self) -> BTreeMap<String, AggregatedMetrics> {
        self.lock()
            .iter()
            .filter_map(|(id, records)| {
                AggregatedMetrics::from_records(id, records).map(|m| (id.clone(), m))
            })
            .collect()
    }

    pub fn get_records(&self, skill_id: &str) -> Vec<ExecutionRecord> {
        self.lock().get(skill_id).cloned().unwrap_or_default()
    }

    pub fn total_records(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Clear one skill, or everything when `skill_id` is `None`.
    pub fn reset(&self, skill_id: Option<&str>) {
        let mut records = self.lock();
        match skill_id {
            Some(id) => {
                records.remove(id);
            }
            None => records.clear(),
        }
    }

    pub fn export_summary(&self) -> MetricsSummary {
        let records = self.lock();
        let all: Vec<&ExecutionRecord> = records.values().flatten().collect();
        let skills: BTreeMap<String, AggregatedMetrics> = records
            .iter()
            .filter_map(|(id, recs)| {
                AggregatedMetrics::from_records(id, recs).map(|m| (id.clone(), m.rounded()))
            })
            .collect();

        let total = all.len();
        let overall = (total > 0).then(|| {
            let n = total as f64;
            let count = |f: fn(&ExecutionRecord) -> bool| all.iter().filter(|r| f(r)).count() as f64;
            OverallRates {
                success_rate: round_to(count(|r| r.success) / n, 3),
                validation_pass_rate: round_to(count(|r| r.validation_passed) / n, 3),
                auto_act_rate: round_to(
                    count(|r| r.decision_type == DecisionType::AutoAct) / n,
                    3,
                ),
                avg_duration_ms: round_to(all.iter().map(|r| r.duration_ms).sum::<f64>() / n, 2),
            }
        });

        MetricsSummary {
            total_executions: total,
            skills_tracked: skills.len(),
            overall,
            skills,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<ExecutionRecord>>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
