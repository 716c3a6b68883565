//! Risk levels declared by skills and adjusted at runtime.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::HarnessError;

/// Ordinal severity of a skill's potential impact.
///
/// Serialized with the same spelling `metadata.yaml` uses (`Low`, `Medium`,
/// `High`, `Critical`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Read-only or informational.
    Low,
    /// Default when nothing is declared.
    Medium,
    /// Requires monitoring.
    High,
    /// Always routed to human approval.
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Ordinal 1..=4 (Low..Critical).
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Map an ordinal back to a level, saturating at `Critical`.
    pub fn from_ordinal(value: u8) -> Self {
        match value {
            0 | 1 => Self::Low,
            2 => Self::Medium,
            3 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = HarnessError;

    /// Parses the canonical spelling case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(HarnessError::UnknownRiskLevel(s.to_string())),
        }
    }
}

/// What a skill's metadata says about its risk level.
///
/// Keeps "nothing declared" and "declared something we do not recognise"
/// apart from a real declaration, so the Medium fallback is explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RiskDeclaration {
    Declared(RiskLevel),
    Missing,
    Unrecognized(String),
}

impl RiskDeclaration {
    /// Level used for evaluation. Anything not explicitly declared is Medium.
    pub fn effective(&self) -> RiskLevel {
        match self {
            Self::Declared(level) => *level,
            Self::Missing | Self::Unrecognized(_) => RiskLevel::Medium,
        }
    }

    /// Interpret a raw `security.risk_level` value.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            None => Self::Missing,
            Some(value) => match value.parse::<RiskLevel>() {
                Ok(level) => Self::Declared(level),
                Err(_) => Self::Unrecognized(value.to_string()),
            },
        }
    }
}
