use crate::constants::HOOK_EVENT_TYPES;
use crate::formats::{security_scan, validate_json};
use crate::models::{ExtensionKind, ValidationResult};
use crate::validators::r#trait::{base_checks, ExtensionValidator};
use anyhow::Result;
use serde_json::Value;
use std::path::Path;

/// Validator for hook definition files
pub struct HookValidator;

impl HookValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_document(&self, doc: &Value, result: &mut ValidationResult) {
        let Some(obj) = doc.as_object() else {
            result.error("HOOK001", "hook document must be a JSON object");
            return;
        };

        match obj.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => {
                result.set_meta("name", Value::String(name.to_string()));
            }
            _ => result.error("HOOK002", "missing required field: name"),
        }

        match obj.get("version").and_then(Value::as_str) {
            Some(version) => {
                if semver::Version::parse(version).is_err() {
                    result.warn("HOOK009", format!("version {version:?} is not semver"));
                }
                result.set_meta("version", Value::String(version.to_string()));
            }
            None => result.error("HOOK003", "missing required field: version"),
        }

        match obj.get("eventTypes").and_then(Value::as_array) {
            Some(events) if !events.is_empty() => {
                let mut names: Vec<Value> = Vec::new();
                for event in events {
                    match event.as_str() {
                        Some(name) if HOOK_EVENT_TYPES.contains(&name) => {
                            if names.iter().any(|n| n.as_str() == Some(name)) {
                                result.warn("HOOK010", format!("duplicate event type {name:?}"));
                            } else {
                                names.push(Value::String(name.to_string()));
                            }
                        }
                        Some(name) => result.error(
                            "HOOK005",
                            format!(
                                "unrecognized event type {name:?}; known events: {}",
                                HOOK_EVENT_TYPES.join(", ")
                            ),
                        ),
                        None => result.error("HOOK005", "eventTypes entries must be strings"),
                    }
                }
                result.set_meta("events", Value::Array(names));
            }
            Some(_) => result.error("HOOK004", "eventTypes must not be empty"),
            None => result.error("HOOK004", "missing required field: eventTypes"),
        }

        match obj.get("commands").and_then(Value::as_array) {
            Some(commands) if !commands.is_empty() => {
                for command in commands {
                    match command.as_str() {
                        Some(cmd) if !cmd.trim().is_empty() => {}
                        _ => result.error("HOOK006", "commands entries must be non-empty strings"),
                    }
                }
            }
            Some(_) => result.error("HOOK006", "commands must not be empty"),
            None => result.error("HOOK006", "missing required field: commands"),
        }

        if let Some(matchers) = obj.get("matchers") {
            match matchers.as_array() {
                Some(patterns) => {
                    let mut ok = Vec::new();
                    for pattern in patterns {
                        match pattern.as_str() {
                            Some(glob) if !glob.trim().is_empty() => {
                                ok.push(Value::String(glob.to_string()));
                            }
                            Some(_) => result.error("HOOK007", "matchers must not be empty strings"),
                            None => result.error("HOOK007", "matchers entries must be strings"),
                        }
                    }
                    result.set_meta("matchers", Value::Array(ok));
                }
                None => result.error("HOOK007", "matchers must be a list of glob patterns"),
            }
        }

        match obj.get("description").and_then(Value::as_str) {
            Some(description) => {
                result.set_meta("description", Value::String(description.to_string()));
            }
            None => result.warn("HOOK008", "no description provided"),
        }
    }
}

#[async_trait::async_trait]
impl ExtensionValidator for HookValidator {
    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Hook
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
