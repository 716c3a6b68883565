//! Validation outcome value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of one validation call.
///
/// Built fresh per call and never mutated afterwards; the fields are only
/// reachable through accessors. Each error carries a locator prefix such as
/// `input.customer.email:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    valid: bool,
    errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    details: Map<String, Value>,
}

impl ValidationResult {
    /// A passing result with no diagnostics.
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            details: Map::new(),
        }
    }

    /// Validity follows the error list: no errors means valid.
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings: Vec::new(),
            details: Map::new(),
        }
    }

    /// A failing result with a single error.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
            details: Map::new(),
        }
    }

    /// A failing placeholder for a validation that never ran (blocked or
    /// errored executions never reach output validation).
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: Vec::new(),
            warnings: vec![format!("not run: {}", reason.into())],
            details: Map::new(),
        }
    }

    pub(crate) fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub(crate) fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.valid { "VALID" } else { "INVALID" })?;
        if !self.errors.is_empty() {
            f.write_str("\nErrors:")?;
            for e in &self.errors {
                write!(f, "\n  {e}")?;
            }
        } else if !self.warnings.is_empty() {
            f.write_str("\nWarnings:")?;
            for w in &self.warnings {
                write!(f, "\n  {w}")?;
            }
        }
        Ok(())
    }
}
