use crate::formats::{security_scan, validate_markdown};
use crate::models::{ExtensionKind, ValidationResult};
use crate::validators::r#trait::{base_checks, ExtensionValidator};
use anyhow::Result;
use serde_json::Value;
use serde_yaml::Mapping;
use std::path::Path;

/// Validator for agent definition files (markdown with YAML frontmatter)
pub struct AgentValidator;

impl AgentValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_frontmatter(&self, meta: &Mapping, result: &mut ValidationResult) {
        match meta.get("name").and_then(serde_yaml::Value::as_str) {
            Some(name) if !name.trim().is_empty() => {
                result.set_meta("name", Value::String(name.to_string()));
            }
            _ => result.error("AGENT002", "missing required frontmatter field: name"),
        }

        match meta.get("description").and_then(serde_yaml::Value::as_str) {
            Some(description) => {
                result.set_meta("description", Value::String(description.to_string()));
            }
            None => result.error("AGENT003", "missing required frontmatter field: description"),
        }

        match meta.get("model").and_then(serde_yaml::Value::as_str) {
            Some(model) => result.set_meta("model", Value::String(model.to_string())),
            None => result.warn("AGENT004", "no model specified; the default model will be used"),
        }

        for (field, code) in [("tools", "AGENT005"), ("permissions", "AGENT006")] {
            if let Some(value) = meta.get(field) {
                match value.as_sequence() {
                    Some(items) => {
                        let names: Vec<Value> = items
                            .iter()
                            .filter_map(serde_yaml::Value::as_str)
                            .map(|s| Value::String(s.to_string()))
                            .collect();
                        if names.len() != items.len() {
                            result.error(code, format!("{field} entries must be strings"));
                        } else if field == "tools" {
                            result.set_meta("tools", Value::Array(names));
                        }
                    }
                    None => result.error(code, format!("{field} must be a list")),
                }
            }
        }

        if let Some(prompt) = meta.get("system_prompt") {
            if !prompt.is_string() {
                result.error("AGENT007", "system_prompt must be a string");
            }
        }
    }
}

#[async_trait::async_trait]
impl ExtensionValidator for AgentValidator {
    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Agent
    }

    fn accepted_extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    async fn validate_file(&self, path: &Path) -> Result<ValidationResult> {
        let (mut result, content) = base_checks(path, self.accepted_extensions()).await?;
        let Some(content) = content else {
            return Ok(result);
        };

        let (md_result, mapping, _body) = validate_markdown(&content);
        result.merge(md_result);
        match mapping {
            Some(meta) => self.check_frontmatter(&meta, &mut result),
            None => result.error("AGENT001", "agent files require YAML frontmatter"),
        }

        result.merge(security_scan(&content));
        Ok(result)
    }
}
