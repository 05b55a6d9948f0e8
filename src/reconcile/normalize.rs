//! Container-shape coercion for required fields.
//!
//! Only required fields are touched, and only their container shape: a
//! required array becomes an array, a required object is recursed into.
//! Field content is never invented.

use super::schema::Schema;
use super::strategies::{
    keep_object_items, parse_embedded_json, parse_embedded_scalar_list, split_scalar_tokens,
    wrap_single,
};
use serde_json::{Map, Value};

/// Reshape `value` so its required fields match their declared containers.
pub fn normalize(value: Value, schema: &Schema) -> Value {
    match (value, schema) {
        (Value::Object(map), Schema::Object { .. }) => Value::Object(normalize_object(map, schema)),
        (other, _) => other,
    }
}

fn normalize_object(mut map: Map<String, Value>, schema: &Schema) -> Map<String, Value> {
    for (name, field_schema) in schema.required_fields() {
        match field_schema {
            Schema::Object { .. } => {
                if let Some(Value::Object(inner)) = map.get_mut(name) {
                    let taken = std::mem::take(inner);
                    *inner = normalize_object(taken, field_schema);
                }
            }
            Schema::Array { items } => {
                let current = map.remove(name);
                map.insert(name.to_string(), Value::Array(coerce_array(current, items)));
            }
            Schema::String | Schema::Number | Schema::Integer | Schema::Boolean => {}
        }
    }
    map
}

/// Coerce whatever sits in a required array slot into an array.
pub fn coerce_array(value: Option<Value>, items: &Schema) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => shape_items(values, items),
        Some(Value::String(text)) => coerce_array_from_string(&text, items),
        Some(Value::Object(map)) => shape_items(wrap_single(Value::Object(map)), items),
        Some(Value::Bool(_) | Value::Number(_)) => Vec::new(),
    }
}

fn coerce_array_from_string(text: &str, items: &Schema) -> Vec<Value> {
    if !items.is_object() {
        return parse_embedded_scalar_list(text, items).unwrap_or_else(|| split_scalar_tokens(text));
    }
    match parse_embedded_json(text) {
        Some(Value::Array(values)) => shape_items(values, items),
        Some(object @ Value::Object(_)) => shape_items(wrap_single(object), items),
        _ => Vec::new(),
    }
}

fn shape_items(values: Vec<Value>, items: &Schema) -> Vec<Value> {
    if !items.is_object() {
        return values;
    }
    keep_object_items(values)
        .into_iter()
        .map(|map| Value::Object(normalize_object(map, items)))
        .collect()
}
