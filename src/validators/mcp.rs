use crate::formats::{security_scan, validate_json};
use crate::models::{ExtensionKind, ValidationResult};
use crate::validators::r#trait::{base_checks, ExtensionValidator};
use anyhow::Result;
use serde_json::Value;
use std::path::Path;

/// Validator for MCP server definition files
pub struct McpValidator;

impl McpValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_document(&self, doc: &Value, result: &mut ValidationResult) {
        let Some(obj) = doc.as_object() else {
            result.error("MCP001", "MCP document must be a JSON object");
            return;
        };

        match obj.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => {
                result.set_meta("name", Value::String(name.to_string()));
            }
            _ => result.error("MCP002", "missing required field: name"),
        }

        // `command` is either an array (executable + args) or a string with a
        // separate `args` array.
        match obj.get("command") {
            Some(Value::Array(parts)) => {
                if obj.contains_key("args") {
                    result.warn("MCP006", "args is ignored when command is an array");
                }
                match parts.first().and_then(Value::as_str) {
                    Some(exe) if !exe.trim().is_empty() => {
                        result.set_meta("command", Value::String(exe.to_string()));
                        let args: Vec<Value> = parts.iter().skip(1).cloned().collect();
                        result.set_meta("args", Value::Array(args));
                    }
                    _ => result.error("MCP004", "command[0] must be a non-empty executable"),
                }
                if parts.iter().any(|p| !p.is_string()) {
                    result.error("MCP004", "command entries must be strings");
                }
            }
            Some(Value::String(exe)) => {
                if exe.trim().is_empty() {
                    result.error("MCP004", "command must be a non-empty executable");
                } else {
                    result.set_meta("command", Value::String(exe.clone()));
                }
                match obj.get("args") {
                    Some(Value::Array(args)) => {
                        if args.iter().any(|a| !a.is_string()) {
                            result.error("MCP005", "args entries must be strings");
                        }
                        result.set_meta("args", Value::Array(args.clone()));
                    }
                    Some(_) => result.error("MCP005", "args must be an array"),
                    None => {}
                }
            }
            Some(_) => result.error("MCP003", "command must be a string or an array"),
            None => result.error("MCP003", "missing required field: command"),
        }

        if let Some(env) = obj.get("env") {
            match env.as_object() {
                Some(vars) => {
                    for (key, value) in vars {
                        if key.trim().is_empty() {
                            result.error("MCP007", "env variable names must not be empty");
                        }
                        if !value.is_string() {
                            result.error(
                                "MCP007",
                                format!("env value for {key:?} must be a string"),
                            );
                        }
                    }
                }
                None => result.error("MCP007", "env must be a map of variable names to values"),
            }
        }

        if let Some(capabilities) = obj.get("capabilities") {
            match capabilities.as_array() {
                Some(items) => {
                    if items.iter().any(|c| !c.is_string()) {
                        result.error("MCP008", "capabilities entries must be strings");
                    }
                }
                None => result.error("MCP008", "capabilities must be a list"),
            }
        }

        if let Some(description) = obj.get("description").and_then(Value::as_str) {
            result.set_meta("description", Value::String(description.to_string()));
        }
    }
}

#[async_trait::async_trait]
impl ExtensionValidator for McpValidator {
    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Mcp
    }

    fn accepted_extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    async fn validate_file(&self, path: &Path) -> Result<ValidationResult> {
        let (mut result, content) = base_checks(path, self.accepted_extensions()).await?;
        let Some(content) = content else {
            return Ok(result);
        };

        let (json_result, doc) = validate_json(&content);
        result.merge(json_result);
        if let Some(doc) = doc {
            self.check_document(&doc, &mut result);
        }

        result.merge(security_scan(&content));
        Ok(result)
    }
}
