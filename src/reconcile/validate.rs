//! Required-field validation with path-qualified reports.

use super::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    /// Paths such as `characters`, `characters[0].name`, `outline.acts`.
    pub missing_fields: Vec<String>,
}

impl Validation {
    pub fn from_missing(missing_fields: Vec<String>) -> Self {
        Self {
            is_valid: missing_fields.is_empty(),
            missing_fields,
        }
    }
}

/// Decides whether a normalized value satisfies a schema.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, data: &Value, schema: &Schema) -> Validation;
}

/// Knobs for what counts as "complete".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPolicy {
    /// Treat an empty required array as incomplete (e.g. a cast list with no one in it).
    pub empty_arrays_incomplete: bool,
}

/// Checks presence and primitive type of every required field, recursively.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldValidator {
    pub policy: ValidatorPolicy,
}

impl RequiredFieldValidator {
    pub fn new(policy: ValidatorPolicy) -> Self {
        Self { policy }
    }

    fn check(&self, data: &Value, schema: &Schema, path: &str, missing: &mut Vec<String>) {
        let Schema::Object { .. } = schema else {
            if !schema.admits(data) {
                missing.push(root_or(path));
            }
            return;
        };
        let Some(map) = data.as_object() else {
            missing.push(root_or(path));
            return;
        };

        for (name, field_schema) in schema.required_fields() {
            let field_path = join(path, name);
            match map.get(name) {
                None | Some(Value::Null) => missing.push(field_path),
                Some(value) => self.check_field(value, field_schema, &field_path, missing),
            }
        }
    }

    fn check_field(&self, value: &Value, schema: &Schema, path: &str, missing: &mut Vec<String>) {
        match schema {
            Schema::Object { .. } => self.check(value, schema, path, missing),
            Schema::Array { items } => {
                let Some(values) = value.as_array() else {
                    missing.push(path.to_string());
                    return;
                };
                if values.is_empty() && self.policy.empty_arrays_incomplete {
                    missing.push(path.to_string());
                    return;
                }
                for (i, item) in values.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    if items.is_object() {
                        self.check(item, items, &item_path, missing);
                    } else if !items.admits(item) {
                        missing.push(item_path);
                    }
                }
            }
            _ => {
                if !schema.admits(value) {
                    missing.push(path.to_string());
                }
            }
        }
    }
}

impl SchemaValidator for RequiredFieldValidator {
    fn validate(&self, data: &Value, schema: &Schema) -> Validation {
        let mut missing = Vec::new();
        self.check(data, schema, "", &mut missing);
        Validation::from_missing(missing)
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn root_or(path: &str) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.to_string()
    }
}
