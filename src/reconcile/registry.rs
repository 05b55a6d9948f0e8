//! Agent role → schema lookup.

use super::schema::Schema;
use anyhow::Context;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

pub trait SchemaRegistry: Send + Sync {
    /// `None` means the role opts out of reconciliation.
    fn schema_for_role(&self, role: &str) -> Option<Arc<Schema>>;
}

#[derive(Debug, Clone, Default)]
pub struct RoleSchemas {
    schemas: HashMap<String, Arc<Schema>>,
}

impl RoleSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roles used by the writing workspace out of the box.
    pub fn builtin() -> anyhow::Result<Self> {
        let table = json!({
            "character_extractor": {
                "type": "object",
                "properties": {
                    "characters": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "description": {"type": "string"},
                                "role": {"type": "string"}
                            },
                            "required": ["name", "description"]
                        }
                    }
                },
                "required": ["characters"]
            },
            "outline_planner": {
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "logline": {"type": "string"},
                    "chapters": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": {"type": "string"},
                                "summary": {"type": "string"},
                                "beats": {"type": "array", "items": {"type": "string"}}
                            },
                            "required": ["title", "summary"]
                        }
                    }
                },
                "required": ["title", "chapters"]
            },
            "emotion_analyst": {
                "type": "object",
                "properties": {
                    "curve": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "position": {"type": "integer"},
                                "emotion": {"type": "string"},
                                "intensity": {"type": "number"}
                            },
                            "required": ["position", "emotion", "intensity"]
                        }
                    },
                    "dominant": {"type": "string"}
                },
                "required": ["curve"]
            },
            "line_editor": {
                "type": "object",
                "properties": {
                    "suggestions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "original": {"type": "string"},
                                "replacement": {"type": "string"},
                                "reason": {"type": "string"},
                                "severity": {"type": "integer"}
                            },
                            "required": ["original", "replacement", "reason"]
                        }
                    }
                },
                "required": ["suggestions"]
            }
        });

        Self::from_json_value(table).context("Invalid built-in role schema table")
    }

    pub fn from_json_value(table: serde_json::Value) -> anyhow::Result<Self> {
        let parsed: BTreeMap<String, Schema> =
            serde_json::from_value(table).context("Invalid role schema table")?;
        Ok(Self::from_map(parsed))
    }

    pub fn from_map(schemas: impl IntoIterator<Item = (String, Schema)>) -> Self {
        Self {
            schemas: schemas
                .into_iter()
                .map(|(role, schema)| (role, Arc::new(schema)))
                .collect(),
        }
    }

    pub fn insert(&mut self, role: impl Into<String>, schema: Schema) {
        self.schemas.insert(role.into(), Arc::new(schema));
    }

    /// Layer `other` over `self`; roles in `other` win.
    pub fn merged(mut self, other: RoleSchemas) -> Self {
        self.schemas.extend(other.schemas);
        self
    }

    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let parsed: BTreeMap<String, Schema> =
            serde_json::from_str(content).context("Invalid role schema table (JSON)")?;
        Ok(Self::from_map(parsed))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let parsed: BTreeMap<String, Schema> =
            toml::from_str(content).context("Invalid role schema table (TOML)")?;
        Ok(Self::from_map(parsed))
    }

    /// Load a `{ role: schema }` table, picking the format by extension.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let loaded = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        loaded.with_context(|| format!("Failed to load schemas from {}", path.display()))
    }
}

impl SchemaRegistry for RoleSchemas {
    fn schema_for_role(&self, role: &str) -> Option<Arc<Schema>> {
        self.schemas.get(role).cloned()
    }
}
