//! Schema validation of skill payloads and skill chains.

pub mod library;
pub mod result;
pub mod validator;

pub use library::{LookupError, SkillLibrary};
pub use result::ValidationResult;
pub use validator::{validate_against, SchemaStage, SchemaValidator};
