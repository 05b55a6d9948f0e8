//! Schema tree describing the shape a role's response must take.
//!
//! Schemas are written in a small JSON-Schema dialect:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": {
//!     "characters": {
//!       "type": "array",
//!       "items": {
//!         "type": "object",
//!         "properties": { "name": { "type": "string" } },
//!         "required": ["name"]
//!       }
//!     }
//!   },
//!   "required": ["characters"]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("required field '{field}' is not declared in properties")]
    UndeclaredRequired { field: String },
    #[error("unsupported schema type '{0}'")]
    UnsupportedType(String),
    #[error("schema type missing")]
    MissingType,
    #[error("invalid schema at '{path}': {source}")]
    Nested {
        path: String,
        #[source]
        source: Box<SchemaError>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema", into = "RawSchema")]
pub enum Schema {
    String,
    Number,
    Integer,
    Boolean,
    Array {
        items: Box<Schema>,
    },
    Object {
        properties: BTreeMap<String, Schema>,
        /// Declaration order is kept so missing-field reports are stable.
        required: Vec<String>,
    },
}

impl Schema {
    pub fn array(items: Schema) -> Self {
        Schema::Array {
            items: Box::new(items),
        }
    }

    /// Build an object node, checking that every required name is declared.
    pub fn object<I, R>(properties: I, required: R) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (String, Schema)>,
        R: IntoIterator<Item = String>,
    {
        let properties: BTreeMap<String, Schema> = properties.into_iter().collect();
        let mut ordered: Vec<String> = Vec::new();
        for field in required {
            if !properties.contains_key(&field) {
                return Err(SchemaError::UndeclaredRequired { field });
            }
            if !ordered.contains(&field) {
                ordered.push(field);
            }
        }
        Ok(Schema::Object {
            properties,
            required: ordered,
        })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, SchemaError> {
        let raw: RawSchema = serde_json::from_value(value.clone()).map_err(|_| {
            value
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| SchemaError::UnsupportedType(t.to_string()))
                .unwrap_or(SchemaError::MissingType)
        })?;
        Schema::try_from(raw)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Schema::String => "string",
            Schema::Number => "number",
            Schema::Integer => "integer",
            Schema::Boolean => "boolean",
            Schema::Array { .. } => "array",
            Schema::Object { .. } => "object",
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Schema::Object { .. })
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Schema::Object { .. } | Schema::Array { .. })
    }

    /// Whether `value` has this schema's JSON type. Containers are not inspected.
    pub fn admits(&self, value: &serde_json::Value) -> bool {
        match self {
            Schema::String => value.is_string(),
            Schema::Number => value.is_number(),
            Schema::Integer => value.is_i64() || value.is_u64(),
            Schema::Boolean => value.is_boolean(),
            Schema::Array { .. } => value.is_array(),
            Schema::Object { .. } => value.is_object(),
        }
    }

    /// Iterate `(name, schema)` for each required field, in declaration order.
    pub fn required_fields(&self) -> impl Iterator<Item = (&str, &Schema)> {
        let fields: Vec<(&str, &Schema)> = match self {
            Schema::Object {
                properties,
                required,
            } => required
                .iter()
                .filter_map(|name| properties.get(name).map(|s| (name.as_str(), s)))
                .collect(),
            _ => Vec::new(),
        };
        fields.into_iter()
    }
}

/// Wire form of a schema node, before invariants are checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawSchema {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    items: Option<Box<RawSchema>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    properties: HashMap<String, RawSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required: Vec<String>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = SchemaError;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        let kind = raw.kind.ok_or(SchemaError::MissingType)?;
        match kind.as_str() {
            "string" => Ok(Schema::String),
            "number" => Ok(Schema::Number),
            "integer" => Ok(Schema::Integer),
            "boolean" => Ok(Schema::Boolean),
            "array" => {
                // Untyped arrays are treated as lists of strings.
                let items = match raw.items {
                    Some(items) => Schema::try_from(*items).map_err(|e| nested("items", e))?,
                    None => Schema::String,
                };
                Ok(Schema::array(items))
            }
            "object" => {
                let mut properties = BTreeMap::new();
                for (name, child) in raw.properties {
                    let schema = Schema::try_from(child).map_err(|e| nested(&name, e))?;
                    properties.insert(name, schema);
                }
                Schema::object(properties, raw.required)
            }
            other => Err(SchemaError::UnsupportedType(other.to_string())),
        }
    }
}

impl From<Schema> for RawSchema {
    fn from(schema: Schema) -> Self {
        let kind = Some(schema.kind().to_string());
        match schema {
            Schema::Array { items } => RawSchema {
                kind,
                items: Some(Box::new(RawSchema::from(*items))),
                ..RawSchema::default()
            },
            Schema::Object {
                properties,
                required,
            } => RawSchema {
                kind,
                properties: properties
                    .into_iter()
                    .map(|(name, child)| (name, RawSchema::from(child)))
                    .collect(),
                required,
                ..RawSchema::default()
            },
            _ => RawSchema {
                kind,
                ..RawSchema::default()
            },
        }
    }
}

fn nested(path: &str, source: SchemaError) -> SchemaError {
    SchemaError::Nested {
        path: path.to_string(),
        source: Box::new(source),
    }
}
