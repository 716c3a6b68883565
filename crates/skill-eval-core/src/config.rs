//! Harness configuration loaded from TOML.
//!
//! ```toml
//! library_path = "skills"
//!
//! [tracer]
//! provider = "otlp"
//! endpoint = "http://localhost:4317"
//!
//! [decision]
//! auto_act_threshold = 0.9
//!
//! [logging]
//! json = true
//! level = "debug"
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::decision::DecisionConfig;
use crate::domain::{HarnessError, Result};
use crate::telemetry::parse_level;
use crate::tracer::{TracerConfig, TracerProvider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<Level> {
        parse_level(&self.level)
            .ok_or_else(|| HarnessError::InvalidConfig(format!("unknown log level: {}", self.level)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub library_path: Option<PathBuf>,
    pub tracer: TracerConfig,
    pub decision: DecisionConfig,
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Parse and validate.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(raw)?;
        if let Some(name) = table
            .get("tracer")
            .and_then(|tracer| tracer.get("provider"))
            .and_then(toml::Value::as_str)
        {
            name.parse::<TracerProvider>()?;
        }
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.decision.validate()?;
        self.logging.level()?;
        Ok(())
    }
}
