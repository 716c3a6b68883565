//! Confidence scoring.
//!
//! Weighted blend of four signals:
//!
//! | signal              | weight | notes                                     |
//! |---------------------|--------|-------------------------------------------|
//! | validation status   | 0.35   | 1.0 when inputs validated, else 0.0       |
//! | input completeness  | 0.25   | share of meaningful input fields          |
//! | historical success  | 0.30   | only with at least 5 recorded executions  |
//! | context quality     | 0.10   | share of the five context indicators      |
//!
//! Without usable history its weight moves to validation (+0.15) and
//! completeness (+0.15). The sum is renormalised by the total weight.

use serde_json::Value;
use tracing::debug;

use super::engine::ExecutionHistory;
use crate::domain::{is_meaningful, ExecutionContext};

pub const VALIDATION_WEIGHT: f64 = 0.35;
pub const COMPLETENESS_WEIGHT: f64 = 0.25;
pub const HISTORY_WEIGHT: f64 = 0.30;
pub const CONTEXT_WEIGHT: f64 = 0.10;

/// Executions needed before history contributes.
pub const MIN_HISTORY_EXECUTIONS: u64 = 5;

/// Completeness of an empty input map.
const EMPTY_INPUT_COMPLETENESS: f64 = 0.3;
/// Context quality when no context is supplied.
const NEUTRAL_CONTEXT_QUALITY: f64 = 0.5;
const CONTEXT_INDICATORS: f64 = 5.0;

/// Stateless confidence calculator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Confidence in `[0, 1]`, rounded to 3 decimals.
    pub fn calculate_confidence(
        &self,
        skill_id: &str,
        input_data: &Value,
        validation_passed: bool,
        execution_history: Option<&ExecutionHistory>,
        context: Option<&ExecutionContext>,
    ) -> f64 {
        let validation = if validation_passed { 1.0 } else { 0.0 };
        let completeness = input_completeness(input_data);
        let context_quality = context_quality(context);

        let mut validation_weight = VALIDATION_WEIGHT;
        let mut completeness_weight = COMPLETENESS_WEIGHT;
        let mut weighted = 0.0;
        let mut total_weight = CONTEXT_WEIGHT;

        match execution_history.filter(|h| h.total_executions >= MIN_HISTORY_EXECUTIONS) {
            Some(history) => {
                weighted += history.success_rate.clamp(0.0, 1.0) * HISTORY_WEIGHT;
                total_weight += HISTORY_WEIGHT;
            }
            None => {
                validation_weight += HISTORY_WEIGHT / 2.0;
                completeness_weight += HISTORY_WEIGHT / 2.0;
            }
        }

        weighted += validation * validation_weight
            + completeness * completeness_weight
            + context_quality * CONTEXT_WEIGHT;
        total_weight += validation_weight + completeness_weight;

        let confidence = round3((weighted / total_weight).clamp(0.0, 1.0));
        debug!(
            skill_id,
            confidence, completeness, context_quality, validation_passed, "confidence calculated"
        );
        confidence
    }
}

/// Share of top-level input fields that carry a meaningful value. An empty
/// (or non-object) input scores a neutral 0.3.
pub fn input_completeness(input_data: &Value) -> f64 {
    match input_data.as_object() {
        Some(fields) if !fields.is_empty() => {
            let filled = fields.values().filter(|v| is_meaningful(v)).count();
            filled as f64 / fields.len() as f64
        }
        _ => EMPTY_INPUT_COMPLETENESS,
    }
}

/// Share of {user, session, prior results, timestamp, metadata} present.
/// No context (or an empty one) is neutral.
pub fn context_quality(context: Option<&ExecutionContext>) -> f64 {
    let Some(ctx) = context.filter(|c| !c.is_empty()) else {
        return NEUTRAL_CONTEXT_QUALITY;
    };
    let extra = |key: &str| ctx.extra.get(key).is_some_and(is_meaningful);
    let non_blank = |id: &Option<String>| id.as_deref().is_some_and(|s| !s.trim().is_empty());

    let indicators = [
        non_blank(&ctx.user_id) || extra("user"),
        non_blank(&ctx.session_id) || extra("session"),
        ctx.previous_results.as_ref().is_some_and(is_meaningful) || extra("upstream_outputs"),
        ctx.timestamp.is_some(),
        !ctx.metadata.is_empty(),
    ];
    indicators.iter().filter(|present| **present).count() as f64 / CONTEXT_INDICATORS
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn history(total: u64, successes: u64) -> ExecutionHistory {
        ExecutionHistory::from_counts(total, successes)
    }

    #[test]
    fn test_completeness() {
        assert_eq!(input_completeness(&json!({})), 0.3);
        assert_eq!(input_completeness(&json!(null)), 0.3);
        assert_eq!(input_completeness(&json!({"a": 1, "b": 2})), 1.0);
        assert_eq!(
            input_completeness(&json!({"a": 1, "b": null, "c": "", "d": []})),
            0.25
        );
    }

    #[test]
    fn test_context_quality() {
        assert_eq!(context_quality(None), 0.5);
        assert_eq!(context_quality(Some(&ExecutionContext::new())), 0.5);

        let partial = ExecutionContext::new().with_user("u1").with_session("s1");
        assert_eq!(context_quality(Some(&partial)), 0.4);

        let full = ExecutionContext::new()
            .with_user("u1")
            .with_session("s1")
            .with_previous_results(json!({"score": 1}))
            .with_timestamp(Utc::now())
            .with_metadata("source", json!("crm"));
        assert_eq!(context_quality(Some(&full)), 1.0);

        let aliased = ExecutionContext::new().with_extra("upstream_outputs", json!({"x": 1}));
        assert_eq!(context_quality(Some(&aliased)), 0.2);
    }

    #[test]
    fn test_blank_ids_do_not_count() {
        let blank = ExecutionContext::new()
            .with_user("")
            .with_session("   ")
            .with_timestamp(Utc::now());
        assert_eq!(context_quality(Some(&blank)), 0.2);

        let one = ExecutionContext::new().with_user("u1").with_session("");
        assert_eq!(context_quality(Some(&one)), 0.2);
    }

    #[test]
    fn test_perfect_without_history() {
        let scorer = ConfidenceScorer::new();
        let full = ExecutionContext::new()
            .with_user("u")
            .with_session("s")
            .with_previous_results(json!([1]))
            .with_timestamp(Utc::now())
            .with_metadata("k", json!(1));
        let c = scorer.calculate_confidence("s", &json!({"a": 1}), true, None, Some(&full));
        assert_eq!(c, 1.0);
    }

    #[test]
    fn test_history_below_minimum_is_ignored() {
        let scorer = ConfidenceScorer::new();
        let input = json!({"a": 1});
        let without = scorer.calculate_confidence("s", &input, true, None, None);
        let short = history(4, 0);
        let with_short = scorer.calculate_confidence("s", &input, true, Some(&short), None);
        assert_eq!(without, with_short);
        // (0.5*1 + 0.4*1 + 0.1*0.5) / 1.0
        assert_eq!(without, 0.95);
    }

    #[test]
    fn test_history_contributes_when_sufficient() {
        let scorer = ConfidenceScorer::new();
        let input = json!({"a": 1});
        let bad = history(10, 0);
        let c = scorer.calculate_confidence("s", &input, true, Some(&bad), None);
        // 0.35 + 0.25 + 0 + 0.05
        assert_eq!(c, 0.65);
    }

    #[test]
    fn test_failed_validation_without_history() {
        let scorer = ConfidenceScorer::new();
        let c = scorer.calculate_confidence("s", &json!({}), false, None, None);
        // 0.4*0.3 + 0.1*0.5
        assert_eq!(c, 0.17);
    }
}
