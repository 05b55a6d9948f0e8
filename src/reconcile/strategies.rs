//! Heuristics for turning a mis-shaped value into an array.
//!
//! Each one is small and separately tested; these are where silently wrong
//! data would come from, so none of them guesses at object content.

use super::parse::parse_response;
use super::schema::Schema;
use serde_json::{Map, Value};

/// Read a string field that holds JSON text, e.g. `"[{\"name\": \"Ada\"}]"`.
///
/// Only containers count; a string that parses to a bare scalar is not
/// structured data.
pub fn parse_embedded_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('[') || trimmed.contains('{')) {
        return None;
    }
    match parse_response(trimmed) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => Some(value),
        _ => None,
    }
}

/// Read a string holding a JSON array of scalars, e.g. `"[1, 2, 3]"`.
///
/// Every item must already have the declared type; anything else (objects
/// pulled out of prose, mixed lists) is left to plain token splitting.
pub fn parse_embedded_scalar_list(text: &str, items: &Schema) -> Option<Vec<Value>> {
    if !text.trim_start().starts_with('[') {
        return None;
    }
    match parse_embedded_json(text)? {
        Value::Array(values) if values.iter().all(|value| items.admits(value)) => Some(values),
        _ => None,
    }
}

/// Wrap a single value as a one-element array.
pub fn wrap_single(value: Value) -> Vec<Value> {
    vec![value]
}

/// Split a newline- or comma-separated list into trimmed, non-empty tokens.
pub fn split_scalar_tokens(text: &str) -> Vec<Value> {
    text.split(['\n', ','])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| Value::String(token.to_string()))
        .collect()
}

/// Keep only the object items of an array.
pub fn keep_object_items(items: Vec<Value>) -> Vec<Map<String, Value>> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}
