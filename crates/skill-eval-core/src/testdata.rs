//! Schema-driven test data.
//!
//! [`TestDataGenerator`] produces valid payloads from a JSON Schema plus a
//! set of edge cases (missing required field, wrong type, empty object)
//! labelled with whether they should pass input validation. Generation is
//! seeded, so the same seed and schema always give the same cases.
//!
//! Test data files are either a bare JSON array of cases or the document
//! written by [`save_test_cases`]:
//!
//! ```json
//! {"skill_id": "...", "generated_at": "...", "num_cases": 2, "test_cases": [...]}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::domain::{HarnessError, Result};
use crate::validation::SchemaValidator;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const DEFAULT_MAX_DEPTH: usize = 5;
const MAX_STRING_LEN: usize = 20;
const MAX_ARRAY_ITEMS: usize = 3;
/// 2024-01-01T00:00:00Z; generated dates fall within the following year.
const BASE_TIMESTAMP: i64 = 1_704_067_200;

/// One input payload and whether it should pass input validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub inputs: Value,
    #[serde(default)]
    pub label: String,
    #[serde(default = "expected_valid_default")]
    pub expected_valid: bool,
}

fn expected_valid_default() -> bool {
    true
}

impl TestCase {
    fn new(inputs: Value, label: impl Into<String>, expected_valid: bool) -> Self {
        Self {
            inputs,
            label: label.into(),
            expected_valid,
        }
    }
}

#[derive(Debug, Serialize)]
struct TestDataFile<'a> {
    skill_id: &'a str,
    generated_at: DateTime<Utc>,
    num_cases: usize,
    test_cases: &'a [TestCase],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TestDataDocument {
    Cases(Vec<TestCase>),
    File { test_cases: Vec<TestCase> },
}

/// Seeded generator of schema-conforming payloads and edge cases.
#[derive(Debug, Clone)]
pub struct TestDataGenerator {
    rng: StdRng,
    max_depth: usize,
}

impl Default for TestDataGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TestDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Nesting beyond `max_depth` generates `null`.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// One value for `schema`. Honours `enum`, `const`, `type`, string
    /// `format`/length bounds, numeric bounds, array item counts and object
    /// `required`; optional properties are included at random. `pattern`
    /// and `multipleOf` are not honoured.
    pub fn generate_from_schema(&mut self, schema: &Value) -> Value {
        self.generate(schema, 0)
    }

    /// Cases that should fail validation (one per required field, one per
    /// typed property) plus the empty object. Non-object schemas have none.
    pub fn generate_edge_cases(&mut self, schema: &Value) -> Vec<TestCase> {
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Vec::new();
        }
        let required = required_fields(schema);
        let mut cases = Vec::new();

        for field in &required {
            let mut inputs = self.generate_from_schema(schema);
            if let Some(fields) = inputs.as_object_mut() {
                fields.remove(field);
            }
            cases.push(TestCase::new(inputs, format!("missing_{field}"), false));
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (field, property) in properties {
                let Some(wrong) = wrong_type_value(type_of(property).unwrap_or("string")) else {
                    continue;
                };
                let mut inputs = self.generate_from_schema(schema);
                if let Some(fields) = inputs.as_object_mut() {
                    fields.insert(field.clone(), wrong);
                }
                cases.push(TestCase::new(inputs, format!("invalid_type_{field}"), false));
            }
        }

        cases.push(TestCase::new(
            Value::Object(Map::new()),
            "empty_object",
            required.is_empty(),
        ));
        cases
    }

    /// `valid_cases` valid payloads for the skill's input schema, followed by
    /// its edge cases when asked.
    pub fn generate_for_skill(
        &mut self,
        validator: &SchemaValidator,
        skill_id: &str,
        valid_cases: usize,
        include_edge_cases: bool,
    ) -> Result<Vec<TestCase>> {
        let definition = validator
            .definition(skill_id)
            .ok_or_else(|| HarnessError::SkillNotFound(skill_id.to_string()))?;
        let schema = definition
            .input_schema
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let mut cases: Vec<TestCase> = (1..=valid_cases)
            .map(|i| TestCase::new(self.generate_from_schema(&schema), format!("valid_case_{i}"), true))
            .collect();
        if include_edge_cases {
            cases.extend(self.generate_edge_cases(&schema));
        }
        debug!(skill_id, cases = cases.len(), "generated test data");
        Ok(cases)
    }

    /// Cases for several skills. A skill that cannot be generated for gets
    /// an empty list and a warning. With `output_dir`, each list is also
    /// saved as `<output_dir>/<skill_id>_test_data.json`.
    pub fn generate_batch(
        &mut self,
        validator: &SchemaValidator,
        skill_ids: &[&str],
        cases_per_skill: usize,
        output_dir: Option<&Path>,
    ) -> BTreeMap<String, Vec<TestCase>> {
        let mut batch = BTreeMap::new();
        for &skill_id in skill_ids {
            let cases = match self.generate_for_skill(validator, skill_id, cases_per_skill, true) {
                Ok(cases) => cases,
                Err(e) => {
                    warn!(skill_id, error = %e, "test data generation failed");
                    Vec::new()
                }
            };
            if let Some(dir) = output_dir {
                let path = dir.join(format!("{skill_id}_test_data.json"));
                if let Err(e) = save_test_cases(skill_id, &cases, &path) {
                    warn!(skill_id, path = %path.display(), error = %e, "saving test data failed");
                }
            }
            batch.insert(skill_id.to_string(), cases);
        }
        batch
    }

    // -----------------------------------------------------------------------
    // Per-type generators
    // -----------------------------------------------------------------------

    fn generate(&mut self, schema: &Value, depth: usize) -> Value {
        if depth > self.max_depth {
            return Value::Null;
        }
        if let Some(choices) = schema.get("enum").and_then(Value::as_array) {
            if let Some(choice) = choices.choose(&mut self.rng) {
                return choice.clone();
            }
        }
        if let Some(constant) = schema.get("const") {
            return constant.clone();
        }

        match type_of(schema).unwrap_or("object") {
            "number" => self.number(schema),
            "integer" => self.integer(schema),
            "boolean" => Value::Bool(self.rng.gen_bool(0.5)),
            "array" => self.array(schema, depth),
            "object" => self.object(schema, depth),
            "null" => Value::Null,
            _ => Value::String(self.string(schema)),
        }
    }

    fn string(&mut self, schema: &Value) -> String {
        match schema.get("format").and_then(Value::as_str) {
            Some("email") => return format!("user_{}@example.com", self.random_string(5)),
            Some("uri") => return format!("https://example.com/{}", self.random_string(8)),
            Some("uuid") => {
                return uuid::Builder::from_random_bytes(self.rng.gen())
                    .into_uuid()
                    .to_string()
            }
            Some("date-time") => return self.timestamp().to_rfc3339(),
            Some("date") => return self.timestamp().date_naive().to_string(),
            _ => {}
        }

        let min_len = bound(schema, "minLength").map_or(1, |n| n as usize);
        let max_len = bound(schema, "maxLength").map_or(MAX_STRING_LEN, |n| n as usize);
        let upper = max_len.min(MAX_STRING_LEN).max(min_len);

        let description = schema
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let hinted = if description.contains("id") {
            Some(format!("test_{}", self.random_string(8)))
        } else if description.contains("name") {
            Some(format!("Test Name {}", self.random_string(4)))
        } else if description.contains("email") {
            Some(format!("user_{}@example.com", self.random_string(5)))
        } else if description.contains("url") || description.contains("uri") {
            Some(format!("https://example.com/{}", self.random_string(8)))
        } else {
            None
        };
        if let Some(value) = hinted.filter(|v| (min_len..=max_len).contains(&v.chars().count())) {
            return value;
        }

        let len = self.rng.gen_range(min_len..=upper);
        self.random_string(len)
    }

    fn number(&mut self, schema: &Value) -> Value {
        let mut min = bound(schema, "minimum").unwrap_or(0.0);
        let mut max = bound(schema, "maximum").unwrap_or(10_000.0);
        if let Some(exclusive) = bound(schema, "exclusiveMinimum") {
            min = min.max(exclusive + 0.01);
        }
        if let Some(exclusive) = bound(schema, "exclusiveMaximum") {
            max = max.min(exclusive - 0.01);
        }
        if max < min {
            max = min;
        }
        let value = (self.rng.gen_range(min..=max) * 100.0).round() / 100.0;
        json!(value.clamp(min, max))
    }

    fn integer(&mut self, schema: &Value) -> Value {
        let mut min = bound(schema, "minimum").map_or(0, |n| n.ceil() as i64);
        let mut max = bound(schema, "maximum").map_or(1_000, |n| n.floor() as i64);
        if let Some(exclusive) = bound(schema, "exclusiveMinimum") {
            min = min.max(exclusive.floor() as i64 + 1);
        }
        if let Some(exclusive) = bound(schema, "exclusiveMaximum") {
            max = max.min(exclusive.ceil() as i64 - 1);
        }
        if max < min {
            max = min;
        }
        json!(self.rng.gen_range(min..=max))
    }

    fn array(&mut self, schema: &Value, depth: usize) -> Value {
        let min_items = bound(schema, "minItems").map_or(0, |n| n as usize);
        let max_items = bound(schema, "maxItems").map_or(MAX_ARRAY_ITEMS, |n| n as usize);
        let count = self
            .rng
            .gen_range(min_items..=max_items.min(MAX_ARRAY_ITEMS).max(min_items));
        let fallback = json!({"type": "string"});
        let items = schema.get("items").unwrap_or(&fallback);
        Value::Array((0..count).map(|_| self.generate(items, depth + 1)).collect())
    }

    fn object(&mut self, schema: &Value, depth: usize) -> Value {
        let empty = Map::new();
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let required = required_fields(schema);
        let fallback = json!({"type": "string"});

        let mut out = Map::new();
        for field in &required {
            let property = properties.get(field).unwrap_or(&fallback);
            out.insert(field.clone(), self.generate(property, depth + 1));
        }
        for (field, property) in properties {
            if !required.contains(field) && self.rng.gen_bool(0.5) {
                out.insert(field.clone(), self.generate(property, depth + 1));
            }
        }
        Value::Object(out)
    }

    fn random_string(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| CHARSET[self.rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }

    fn timestamp(&mut self) -> DateTime<Utc> {
        let offset = self.rng.gen_range(0..365 * 24 * 3600);
        DateTime::from_timestamp(BASE_TIMESTAMP + offset, 0).unwrap_or_default()
    }
}

/// Write cases with their skill id, generation time and count.
pub fn save_test_cases(skill_id: &str, cases: &[TestCase], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = TestDataFile {
        skill_id,
        generated_at: Utc::now(),
        num_cases: cases.len(),
        test_cases: cases,
    };
    std::fs::write(path, serde_json::to_vec_pretty(&file)?)?;
    Ok(())
}

/// Read a test data file in either accepted shape.
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let raw = std::fs::read(path)?;
    Ok(match serde_json::from_slice(&raw)? {
        TestDataDocument::Cases(cases) | TestDataDocument::File { test_cases: cases } => cases,
    })
}

/// First non-null `type`; `type` may be a string or a list.
fn type_of(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

fn required_fields(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn bound(schema: &Value, key: &str) -> Option<f64> {
    schema.get(key).and_then(Value::as_f64)
}

fn wrong_type_value(expected: &str) -> Option<Value> {
    match expected {
        "string" => Some(json!(12345)),
        "number" | "integer" => Some(json!("not_a_number")),
        "boolean" => Some(json!("yes")),
        "array" => Some(json!("not_an_array")),
        "object" => Some(json!("not_an_object")),
        _ => None,
    }
}
