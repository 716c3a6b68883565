//! Confidence scoring, risk evaluation and the decision engine.

pub mod confidence;
pub mod engine;
pub mod risk;

pub use confidence::{context_quality, input_completeness, ConfidenceScorer};
pub use engine::{Decision, DecisionConfig, DecisionEngine, DecisionType, ExecutionHistory};
pub use risk::{RiskAssessment, RiskEvaluator, RuntimeRiskFactors};
