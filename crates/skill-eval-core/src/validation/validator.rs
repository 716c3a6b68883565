//! Runtime JSON Schema validation for skill inputs, outputs and chains.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::library::SkillLibrary;
use super::result::ValidationResult;
use crate::domain::{Result, RiskDeclaration, RiskLevel, SkillDefinition, SkillMetadata};
use crate::obs;

/// Which side of a skill a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStage {
    Input,
    Output,
}

impl SchemaStage {
    fn prefix(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    fn schema_key(self) -> &'static str {
        match self {
            Self::Input => "inputSchema",
            Self::Output => "outputSchema",
        }
    }

    fn schema_of(self, definition: &SkillDefinition) -> Option<&Value> {
        match self {
            Self::Input => definition.input_schema.as_ref(),
            Self::Output => definition.output_schema.as_ref(),
        }
    }
}

/// Validates skill payloads against their declared schemas and resolves
/// static risk levels.
///
/// Every method returns a value; a missing skill or a broken schema is an
/// invalid [`ValidationResult`], never an error or a panic.
///
/// Schemas are compiled once per skill and stage; re-registering a skill
/// drops its compiled schemas.
pub struct SchemaValidator {
    library: SkillLibrary,
    compiled: Mutex<HashMap<(String, SchemaStage), Arc<jsonschema::Validator>>>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("library", &self.library)
            .field("compiled_schemas", &self.lock_compiled().len())
            .finish()
    }
}

impl SchemaValidator {
    /// Validator over a skills library directory.
    pub fn new(library_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            library: SkillLibrary::open(library_root)?,
            compiled: Mutex::new(HashMap::new()),
        })
    }

    /// Validator whose skills are registered programmatically.
    pub fn in_memory() -> Self {
        Self {
            library: SkillLibrary::in_memory(),
            compiled: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, definition: SkillDefinition, metadata: Option<SkillMetadata>) {
        self.lock_compiled().retain(|(id, _), _| *id != definition.id);
        self.library.register(definition, metadata);
    }

    pub fn library(&self) -> &SkillLibrary {
        &self.library
    }

    /// Cached definition, if the skill exists.
    pub fn definition(&self, skill_id: &str) -> Option<Arc<SkillDefinition>> {
        self.library.definition(skill_id).ok()
    }

    pub fn validate_input(&self, skill_id: &str, data: &Value) -> ValidationResult {
        self.validate_stage(skill_id, SchemaStage::Input, data)
    }

    pub fn validate_output(&self, skill_id: &str, data: &Value) -> ValidationResult {
        self.validate_stage(skill_id, SchemaStage::Output, data)
    }

    fn validate_stage(&self, skill_id: &str, stage: SchemaStage, data: &Value) -> ValidationResult {
        let definition = match self.library.definition(skill_id) {
            Ok(def) => def,
            Err(e) => return ValidationResult::invalid(e.to_string()),
        };
        let Some(schema) = stage.schema_of(&definition) else {
            return ValidationResult::invalid(format!(
                "Skill '{skill_id}' has no {} defined",
                stage.schema_key()
            ));
        };
        match self.compiled_schema(skill_id, stage, schema) {
            Ok(compiled) => check(stage, &compiled, schema, data),
            Err(invalid) => invalid,
        }
    }

    /// Broken schemas are not cached; they fail again on the next call.
    fn compiled_schema(
        &self,
        skill_id: &str,
        stage: SchemaStage,
        schema: &Value,
    ) -> std::result::Result<Arc<jsonschema::Validator>, ValidationResult> {
        let key = (skill_id.to_string(), stage);
        if let Some(compiled) = self.lock_compiled().get(&key) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(compile(stage, schema)?);
        self.lock_compiled().insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    fn lock_compiled(
        &self,
    ) -> MutexGuard<'_, HashMap<(String, SchemaStage), Arc<jsonschema::Validator>>> {
        self.compiled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// What the skill's metadata declares about risk.
    pub fn risk_declaration(&self, skill_id: &str) -> RiskDeclaration {
        self.library
            .metadata(skill_id)
            .map(|meta| meta.risk_declaration())
            .unwrap_or(RiskDeclaration::Missing)
    }

    /// Static risk level; Medium when metadata is missing or unrecognised.
    pub fn get_risk_level(&self, skill_id: &str) -> RiskLevel {
        self.risk_declaration(skill_id).effective()
    }

    /// Check that `consumer`'s required inputs can be fed from `producer`'s
    /// declared outputs.
    ///
    /// Without mappings, names match exactly first, then case-insensitively
    /// (with a warning). With mappings (`"output.x" -> "input.y"`, matched on
    /// the last dotted segment), every required field needs a mapping whose
    /// source exists in the producer output.
    pub fn validate_chain_compatibility(
        &self,
        producer_id: &str,
        consumer_id: &str,
        field_mappings: Option<&BTreeMap<String, String>>,
    ) -> ValidationResult {
        let producer = match self.library.definition(producer_id) {
            Ok(def) => def,
            Err(e) => return ValidationResult::invalid(e.to_string()),
        };
        let consumer = match self.library.definition(consumer_id) {
            Ok(def) => def,
            Err(e) => return ValidationResult::invalid(e.to_string()),
        };
        // An empty mapping table means "match by name", same as none.
        let field_mappings = field_mappings.filter(|m| !m.is_empty());

        let empty = serde_json::Map::new();
        let producer_output = producer.output_properties().unwrap_or(&empty);
        let consumer_props = consumer.input_properties().unwrap_or(&empty);
        let consumer_required = consumer.required_inputs();

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for required in &consumer_required {
            match field_mappings {
                Some(mappings) => {
                    let mapped = mappings
                        .iter()
                        .find(|(_, input_field)| last_segment(input_field) == required);
                    match mapped {
                        Some((output_field, _)) => {
                            let source = last_segment(output_field);
                            if !producer_output.contains_key(source) {
                                errors.push(format!(
                                    "Required field '{required}' mapped to '{source}' which doesn't exist in producer output"
                                ));
                            }
                        }
                        None => errors.push(format!(
                            "Required field '{required}' has no mapping from producer"
                        )),
                    }
                }
                None => {
                    if producer_output.contains_key(required) {
                        continue;
                    }
                    let lowered = required.to_lowercase();
                    match producer_output.keys().find(|k| k.to_lowercase() == lowered) {
                        Some(candidate) => warnings.push(format!(
                            "Field '{required}' has case mismatch with producer field '{candidate}'"
                        )),
                        None => errors.push(format!(
                            "Required field '{required}' not found in producer output"
                        )),
                    }
                }
            }
        }

        if let Some(mappings) = field_mappings {
            for (output_field, input_field) in mappings {
                let source = last_segment(output_field);
                let target = last_segment(input_field);
                let producer_type = producer_output.get(source).and_then(|p| p.get("type"));
                let consumer_type = consumer_props.get(target).and_then(|p| p.get("type"));
                if let (Some(pt), Some(ct)) = (producer_type, consumer_type) {
                    if pt != ct {
                        warnings.push(format!(
                            "Type mismatch: {source} ({}) -> {target} ({})",
                            type_label(pt),
                            type_label(ct)
                        ));
                    }
                }
            }
        }

        let result = ValidationResult::from_errors(errors)
            .with_warnings(warnings)
            .with_detail(
                "producerOutputFields",
                json!(producer_output.keys().collect::<Vec<_>>()),
            )
            .with_detail("consumerRequiredFields", json!(consumer_required))
            .with_detail("fieldMappings", json!(field_mappings));

        obs::emit_chain_validated(producer_id, consumer_id, result.is_valid());
        result
    }
}

/// Validate `data` against `schema` with Draft 2020-12 semantics, collecting
/// every violation.
pub fn validate_against(stage: SchemaStage, schema: &Value, data: &Value) -> ValidationResult {
    match compile(stage, schema) {
        Ok(validator) => check(stage, &validator, schema, data),
        Err(invalid) => invalid,
    }
}

fn compile(
    stage: SchemaStage,
    schema: &Value,
) -> std::result::Result<jsonschema::Validator, ValidationResult> {
    jsonschema::draft202012::new(schema).map_err(|e| {
        ValidationResult::invalid(format!(
            "{}: invalid {}: {e}",
            stage.prefix(),
            stage.schema_key()
        ))
    })
}

fn check(
    stage: SchemaStage,
    validator: &jsonschema::Validator,
    schema: &Value,
    data: &Value,
) -> ValidationResult {
    let prefix = stage.prefix();
    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|error| {
            let path = dotted_path(&error.instance_path.to_string());
            if path.is_empty() {
                format!("{prefix}: {error}")
            } else {
                format!("{prefix}.{path}: {error}")
            }
        })
        .collect();

    ValidationResult::from_errors(errors)
        .with_detail("schema", schema.clone())
        .with_detail("data", data.clone())
}

/// `/customer/emails/0` -> `customer.emails.0`
fn dotted_path(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

/// `output.partner_id` -> `partner_id`.
pub(crate) fn last_segment(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}

fn type_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
