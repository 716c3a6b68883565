//! Domain models shared by every harness component.
//!
//! - `SkillDefinition` / `SkillMetadata`: what a skill declares
//! - `RiskLevel` / `RiskDeclaration`: static risk classification
//! - `ExecutionContext`: caller-supplied context for an execution
//! - `HarnessError`: construction, I/O and workflow errors

pub mod context;
pub mod error;
pub mod risk;
pub mod skill;

pub use context::{is_meaningful, ExecutionContext};
pub use error::{HarnessError, Result};
pub use risk::{RiskDeclaration, RiskLevel};
pub use skill::{SecurityMetadata, SkillDefinition, SkillMetadata};
