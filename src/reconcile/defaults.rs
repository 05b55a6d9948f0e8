use super::schema::Schema;
use serde_json::{Map, Value};

/// Minimal value of the declared type; objects get only their required fields.
pub fn synthesize(schema: &Schema) -> Value {
    match schema {
        Schema::String => Value::String(String::new()),
        Schema::Number | Schema::Integer => Value::from(0),
        Schema::Boolean => Value::Bool(false),
        Schema::Array { .. } => Value::Array(Vec::new()),
        Schema::Object { .. } => Value::Object(
            schema
                .required_fields()
                .map(|(name, field)| (name.to_string(), synthesize(field)))
                .collect::<Map<String, Value>>(),
        ),
    }
}
