//! Runtime risk evaluation on top of a skill's declared risk level.

use serde::{Deserialize, Serialize};

use crate::domain::RiskLevel;

/// What an execution is about to do, as reported by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeRiskFactors {
    pub has_external_api_calls: bool,
    pub modifies_data: bool,
    pub financial_operation: bool,
    pub accesses_pii: bool,
    pub system_level_operation: bool,
}

impl RuntimeRiskFactors {
    /// Ordinal increase these factors imply.
    pub fn adjustment(&self) -> u8 {
        let mut adj = 0;
        if self.has_external_api_calls {
            adj += 1;
        }
        if self.modifies_data {
            adj += 1;
        }
        if self.financial_operation {
            adj += 2;
        }
        if self.accesses_pii {
            adj += 1;
        }
        if self.system_level_operation {
            adj += 1;
        }
        adj
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub static_risk: RiskLevel,
    pub risk_adjustment: u8,
    pub runtime_factors: RuntimeRiskFactors,
    pub requires_monitoring: bool,
    pub requires_audit_logging: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RiskEvaluator;

impl RiskEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Raise the static level by the runtime factors, capped at Critical.
    pub fn evaluate_risk(
        &self,
        static_risk: RiskLevel,
        runtime_factors: Option<&RuntimeRiskFactors>,
    ) -> RiskAssessment {
        let factors = runtime_factors.copied().unwrap_or_default();
        let adjustment = factors.adjustment();
        let adjusted = static_risk.ordinal().saturating_add(adjustment).min(4);
        RiskAssessment {
            risk_level: RiskLevel::from_ordinal(adjusted),
            static_risk,
            risk_adjustment: adjustment,
            runtime_factors: factors,
            requires_monitoring: adjusted >= 3,
            requires_audit_logging: adjusted >= 2,
        }
    }

    /// Critical always; High below 0.85; Medium below 0.60; Low never.
    pub fn should_require_approval(&self, risk_level: RiskLevel, confidence: f64) -> bool {
        match risk_level {
            RiskLevel::Critical => true,
            RiskLevel::High => confidence < 0.85,
            RiskLevel::Medium => confidence < 0.60,
            RiskLevel::Low => false,
        }
    }

    pub fn get_mitigation_recommendations(
        &self,
        risk_level: RiskLevel,
        runtime_factors: Option<&RuntimeRiskFactors>,
    ) -> Vec<String> {
        let mut out: Vec<&str> = Vec::new();

        if risk_level >= RiskLevel::High {
            out.extend([
                "Enable audit logging for all executions",
                "Require human review for edge cases",
            ]);
        }
        if risk_level == RiskLevel::Critical {
            out.extend([
                "Implement two-phase commit for operations",
                "Add rollback capability",
                "Require approval from authorized personnel",
            ]);
        }

        if let Some(f) = runtime_factors {
            if f.has_external_api_calls {
                out.extend([
                    "Implement timeout and retry logic",
                    "Add circuit breaker for external API failures",
                ]);
            }
            if f.financial_operation {
                out.extend([
                    "Add transaction limits and approval thresholds",
                    "Implement preview mode before execution",
                    "Enable rollback window",
                ]);
            }
            if f.modifies_data {
                out.extend(["Create backup before modification", "Add data validation checks"]);
            }
        }

        out.into_iter().map(str::to_string).collect()
    }
}
