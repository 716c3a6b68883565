//! Skill definitions (`skill.json`) and metadata (`metadata.yaml`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::risk::RiskDeclaration;

/// A declared, schema-typed unit of work, as read from `skill.json`.
///
/// Immutable once loaded; the validator caches it by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDefinition {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// JSON Schema (Draft 2020-12) for inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// JSON Schema (Draft 2020-12) for outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl SkillDefinition {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            name: None,
            description: None,
            domain: None,
            input_schema: None,
            output_schema: None,
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Names declared under `outputSchema.properties`.
    pub fn output_properties(&self) -> Option<&serde_json::Map<String, Value>> {
        self.output_schema
            .as_ref()
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
    }

    /// Names declared under `inputSchema.properties`.
    pub fn input_properties(&self) -> Option<&serde_json::Map<String, Value>> {
        self.input_schema
            .as_ref()
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
    }

    /// Entries of `inputSchema.required` that are strings.
    pub fn required_inputs(&self) -> Vec<String> {
        self.input_schema
            .as_ref()
            .and_then(|s| s.get("required"))
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `security` block of `metadata.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetadata {
    #[serde(default)]
    pub risk_level: Option<String>,
}

/// The parts of `metadata.yaml` the harness reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(default)]
    pub security: Option<SecurityMetadata>,
}

impl SkillMetadata {
    pub fn with_risk_level(level: impl Into<String>) -> Self {
        Self {
            security: Some(SecurityMetadata {
                risk_level: Some(level.into()),
            }),
        }
    }

    pub fn risk_declaration(&self) -> RiskDeclaration {
        RiskDeclaration::from_raw(
            self.security
                .as_ref()
                .and_then(|s| s.risk_level.as_deref()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RiskLevel;
    use serde_json::json;

    #[test]
    fn test_definition_parses_camel_case_schemas() {
        let raw = json!({
            "id": "lead_scorer",
            "version": "1.2.0",
            "domain": "sales",
            "inputSchema": {"type": "object", "required": ["email"], "properties": {"email": {"type": "string"}}},
            "outputSchema": {"type": "object", "properties": {"score": {"type": "number"}}}
        });
        let def: SkillDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(def.id, "lead_scorer");
        assert_eq!(def.required_inputs(), vec!["email".to_string()]);
        assert!(def.output_properties().unwrap().contains_key("score"));
        assert!(def.input_properties().unwrap().contains_key("email"));
    }

    #[test]
    fn test_definition_without_schemas() {
        let def: SkillDefinition = serde_json::from_value(json!({"id": "bare"})).unwrap();
        assert!(def.input_schema.is_none());
        assert!(def.required_inputs().is_empty());
        assert!(def.output_properties().is_none());
    }

    #[test]
    fn test_metadata_yaml_risk_level() {
        let meta: SkillMetadata =
            serde_yaml::from_str("security:\n  risk_level: High\nowner: growth\n").unwrap();
        assert_eq!(meta.risk_declaration().effective(), RiskLevel::High);
    }

    #[test]
    fn test_metadata_without_security_block() {
        let meta: SkillMetadata = serde_yaml::from_str("owner: growth\n").unwrap();
        assert_eq!(meta.risk_declaration(), RiskDeclaration::Missing);
    }
}
