//! Per-skill aggregation of execution records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::record::ExecutionRecord;
use crate::decision::DecisionType;

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

/// Summary of every record for one skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub skill_id: String,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub validation_passed: usize,
    pub validation_failed: usize,
    pub success_rate: f64,
    pub validation_pass_rate: f64,
    pub auto_act_rate: f64,
    pub latency: LatencyStats,
    /// Count per decision type, keyed by its snake_case name.
    pub decisions: BTreeMap<String, usize>,
    /// Count per error type.
    pub errors: BTreeMap<String, usize>,
}

impl AggregatedMetrics {
    /// `None` for an empty slice.
    pub fn from_records(skill_id: &str, records: &[ExecutionRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let total = records.len();
        let successful = records.iter().filter(|r| r.success).count();
        let validation_passed = records.iter().filter(|r| r.validation_passed).count();

        let mut decisions = BTreeMap::new();
        for record in records {
            *decisions
                .entry(record.decision_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        let auto_act = decisions
            .get(DecisionType::AutoAct.as_str())
            .copied()
            .unwrap_or(0);

        let mut errors = BTreeMap::new();
        for error_type in records.iter().filter_map(|r| r.error_type.as_deref()) {
            *errors.entry(error_type.to_string()).or_insert(0) += 1;
        }

        let durations: Vec<f64> = records.iter().map(|r| r.duration_ms).collect();

        Some(Self {
            skill_id: skill_id.to_string(),
            total_executions: total,
            successful_executions: successful,
            failed_executions: total - successful,
            validation_passed,
            validation_failed: total - validation_passed,
            success_rate: ratio(successful, total),
            validation_pass_rate: ratio(validation_passed, total),
            auto_act_rate: ratio(auto_act, total),
            latency: latency_stats(&durations),
            decisions,
            errors,
        })
    }

    /// Rounded view for reports: rates to 3 decimals, latency to 2.
    pub fn rounded(&self) -> Self {
        let l = &self.latency;
        Self {
            success_rate: round_to(self.success_rate, 3),
            validation_pass_rate: round_to(self.validation_pass_rate, 3),
            auto_act_rate: round_to(self.auto_act_rate, 3),
            latency: LatencyStats {
                avg: round_to(l.avg, 2),
                p50: round_to(l.p50, 2),
                p95: round_to(l.p95, 2),
                p99: round_to(l.p99, 2),
                min: round_to(l.min, 2),
                max: round_to(l.max, 2),
            },
            ..self.clone()
        }
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Nearest-rank percentile at index `floor(n * p)`, clamped to `n - 1`.
///
/// `sorted` must be ascending. `None` when it is empty.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    let idx = ((n as f64) * p).floor() as usize;
    sorted.get(idx.min(n.saturating_sub(1))).copied()
}

fn latency_stats(durations: &[f64]) -> LatencyStats {
    let mut sorted = durations.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 0 {
        return LatencyStats {
            avg: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }
    let min = sorted[0];
    let max = sorted[n - 1];
    // Clamp guards against float summation drifting outside [min, max].
    let avg = (sorted.iter().sum::<f64>() / n as f64).max(min).min(max);
    LatencyStats {
        avg,
        p50: percentile(&sorted, 0.50).unwrap_or_default(),
        p95: percentile(&sorted, 0.95).unwrap_or_default(),
        p99: percentile(&sorted, 0.99).unwrap_or_default(),
        min,
        max,
    }
}
