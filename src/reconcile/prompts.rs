use super::defaults::synthesize;
use super::log::Defect;
use super::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MISSING_FIELDS_TEMPLATE: &str = r#"Your previous {{role}} response was valid JSON but did not match the required structure.

Missing or incomplete fields:
{{fields}}

Regenerate the COMPLETE response. RULES:
- Output ONLY the corrected JSON, nothing else
- No explanations, no markdown fences, no commentary
- Keep every field you already produced
- Required structure (empty values shown only as a shape hint):
{{skeleton}}"#;

pub const PARSE_ERROR_TEMPLATE: &str = r#"Your previous {{role}} response could not be parsed as JSON.

Parse error: {{error}}

Start of your response:
{{excerpt}}

Regenerate the COMPLETE response. RULES:
- Output ONLY valid JSON, nothing else
- No explanations, no markdown fences, no commentary
- Ensure strings are properly quoted and escaped
- Ensure the JSON is complete (not truncated)
- Required structure (empty values shown only as a shape hint):
{{skeleton}}"#;

/// Compensation prompt templates. Placeholders: `{{role}}`, `{{fields}}`,
/// `{{error}}`, `{{excerpt}}`, `{{skeleton}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub missing_fields: String,
    pub parse_error: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            missing_fields: MISSING_FIELDS_TEMPLATE.to_string(),
            parse_error: PARSE_ERROR_TEMPLATE.to_string(),
        }
    }
}

/// Replace `{{name}}` placeholders; unknown placeholders are left as written.
pub fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let name = after[..close].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[open..open + 2 + close + 2]),
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build the follow-up instruction describing what was wrong.
pub fn compensation_prompt(
    role: &str,
    defect: &Defect,
    schema: &Schema,
    templates: &PromptTemplates,
) -> String {
    let skeleton = serde_json::to_string_pretty(&synthesize(schema)).unwrap_or_default();
    let mut vars: HashMap<&str, String> = HashMap::new();
    vars.insert("role", role.to_string());
    vars.insert("skeleton", skeleton);

    match defect {
        Defect::MissingFields { fields } => {
            let listed = fields
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n");
            vars.insert("fields", listed);
            render_template(&templates.missing_fields, &vars)
        }
        Defect::ParseError { message, excerpt } => {
            vars.insert("error", message.clone());
            vars.insert("excerpt", excerpt.clone());
            render_template(&templates.parse_error, &vars)
        }
    }
}
