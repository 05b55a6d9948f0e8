//! Presence and primitive-type guarantees for required leaves.
//!
//! Runs after normalization. Absent required fields get their synthesized
//! default, then every required value is coerced to its declared type.

use super::defaults::synthesize;
use super::normalize::coerce_array;
use super::schema::Schema;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

static INTEGER_RE: OnceLock<Regex> = OnceLock::new();
static DECIMAL_RE: OnceLock<Regex> = OnceLock::new();

fn integer_re() -> &'static Regex {
    INTEGER_RE.get_or_init(|| Regex::new(r"-?\d+").unwrap_or_else(|_| Regex::new("$^").unwrap()))
}

fn decimal_re() -> &'static Regex {
    DECIMAL_RE.get_or_init(|| {
        Regex::new(r"-?\d+(?:\.\d+)?|-?\.\d+").unwrap_or_else(|_| Regex::new("$^").unwrap())
    })
}

const TRUTHY: &[&str] = &["true", "yes", "y", "on", "1"];
const FALSY: &[&str] = &["false", "no", "n", "off", "0", ""];

/// Fill and type-correct every required field of `value` under `schema`.
pub fn repair_required(value: Value, schema: &Schema) -> Value {
    match schema {
        Schema::Object { .. } => match value {
            Value::Object(map) => Value::Object(repair_object(map, schema)),
            _ => synthesize(schema),
        },
        _ => coerce_to(value, schema),
    }
}

fn repair_object(mut map: Map<String, Value>, schema: &Schema) -> Map<String, Value> {
    for (name, field_schema) in schema.required_fields() {
        let current = map.remove(name).unwrap_or_else(|| synthesize(field_schema));
        map.insert(name.to_string(), coerce_to(current, field_schema));
    }
    map
}

fn coerce_to(value: Value, schema: &Schema) -> Value {
    match schema {
        Schema::String => Value::String(coerce_string(value)),
        Schema::Integer => Value::from(coerce_integer(&value)),
        Schema::Number => number_value(coerce_number(&value)),
        Schema::Boolean => Value::Bool(coerce_boolean(&value)),
        Schema::Object { .. } => repair_required(value, schema),
        Schema::Array { items } => {
            let values = match value {
                Value::Array(values) => values,
                other => coerce_array(Some(other), items),
            };
            Value::Array(values.into_iter().map(|item| coerce_to(item, items)).collect())
        }
    }
}

pub fn coerce_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Truncate numbers; otherwise pull the first integer out of the text.
pub fn coerce_integer(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(f) = trimmed.parse::<f64>() {
                if f.is_finite() {
                    return f.trunc() as i64;
                }
            }
            integer_re()
                .find(trimmed)
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Decimal-aware extraction; anything unreadable or non-finite is 0.
pub fn coerce_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<f64>().ok().or_else(|| {
                decimal_re()
                    .find(trimmed)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
            })
        }
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

pub fn coerce_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let token = s.trim().to_ascii_lowercase();
            if TRUTHY.contains(&token.as_str()) {
                true
            } else if FALSY.contains(&token.as_str()) {
                false
            } else {
                !s.is_empty()
            }
        }
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Keep integral results as JSON integers so `3` does not become `3.0`.
fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or_else(|| Value::from(0))
    }
}
