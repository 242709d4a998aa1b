use crate::formats::{security_scan, validate_markdown};
use crate::models::{ExtensionKind, ValidationResult};
use crate::validators::r#trait::{base_checks, ExtensionValidator};
use anyhow::Result;
use serde_json::Value;
use serde_yaml::Mapping;
use std::path::Path;

/// Validator for slash-command definition files (markdown with YAML frontmatter)
pub struct CommandValidator;

impl CommandValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_frontmatter(&self, meta: &Mapping, result: &mut ValidationResult) {
        match meta.get("name").and_then(serde_yaml::Value::as_str) {
            Some(name) if !name.trim().is_empty() => {
                result.set_meta("name", Value::String(name.to_string()));
            }
            _ => result.error("CMD002", "missing required frontmatter field: name"),
        }

        match meta.get("description").and_then(serde_yaml::Value::as_str) {
            Some(description) => {
                result.set_meta("description", Value::String(description.to_string()));
            }
            None => result.error("CMD003", "missing required frontmatter field: description"),
        }

        if let Some(aliases) = meta.get("aliases") {
            match aliases.as_sequence() {
                Some(items) => {
                    let names: Vec<Value> = items
                        .iter()
                        .filter_map(serde_yaml::Value::as_str)
                        .map(|s| Value::String(s.to_string()))
                        .collect();
                    if names.len() != items.len() {
                        result.error("CMD004", "aliases entries must be strings");
                    } else {
                        result.set_meta("aliases", Value::Array(names));
                    }
                }
                None => result.error("CMD004", "aliases must be a list"),
            }
        }
    }

    /// The body must carry an H1 or H2 heading whose text starts with `/`,
    /// which establishes the slash trigger.
    fn find_slash_trigger(&self, body: &str) -> Option<String> {
        body.lines().find_map(|line| {
            let trimmed = line.trim_start();
            let heading = trimmed
                .strip_prefix("## ")
                .or_else(|| trimmed.strip_prefix("# "))?;
            let text = heading.trim();
            text.starts_with('/').then(|| {
                text.split_whitespace()
                    .next()
                    .unwrap_or(text)
                    .to_string()
            })
        })
    }
}

#[async_trait::async_trait]
impl ExtensionValidator for CommandValidator {
    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Command
    }

    fn accepted_extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    async fn validate_file(&self, path: &Path) -> Result<ValidationResult> {
        let (mut result, content) = base_checks(path, self.accepted_extensions()).await?;
        let Some(content) = content else {
            return Ok(result);
        };

        let (md_result, mapping, body) = validate_markdown(&content);
        result.merge(md_result);
        match mapping {
            Some(meta) => self.check_frontmatter(&meta, &mut result),
            None => result.error("CMD001", "command files require YAML frontmatter"),
        }

        match self.find_slash_trigger(&body) {
            Some(trigger) => {
                if let Some(name) = result.meta_str("name") {
                    if trigger.trim_start_matches('/') != name {
                        result.warn(
                            "CMD006",
                            format!("trigger {trigger} does not match the declared name {name:?}"),
                        );
                    }
                }
                result.set_meta("trigger", Value::String(trigger));
            }
            None => result.error(
                "CMD005",
                "body must contain a level-1 or level-2 heading starting with '/'",
            ),
        }

        result.merge(security_scan(&content));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn validate(content: &str) -> ValidationResult {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cmd.md");
        fs::write(&path, content).unwrap();
        CommandValidator::new().validate_file(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_valid_command() {
        let result = validate(
            "---\nname: deploy\ndescription: Deploy the current branch\naliases:\n  - ship\n---\n## /deploy [env]\n\nDeploys.\n",
        )
        .await;
        assert!(result.valid, "errors: {:?}", result.errors);
        assert_eq!(result.meta_str("trigger"), Some("/deploy"));
    }

    #[tokio::test]
    async fn test_command_without_slash_heading() {
        let result = validate("---\nname: x\ndescription: d\n---\n# deploy\n\nBody.\n").await;
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.code == "CMD005"));
    }

    #[tokio::test]
    async fn test_command_h1_trigger() {
        let result = validate("---\nname: x\ndescription: d\n---\n# /x\n").await;
        assert!(result.valid, "errors: {:?}", result.errors);
        assert_eq!(result.meta_str("trigger"), Some("/x"));
    }

    #[tokio::test]
    async fn test_command_bad_aliases() {
        let result =
            validate("---\nname: x\ndescription: d\naliases: solo\n---\n# /x\n").await;
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.code == "CMD004"));
    }

    #[tokio::test]
    async fn test_command_trigger_name_mismatch_warns() {
        let result = validate("---\nname: deploy\ndescription: d\n---\n## /ship\n").await;
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.code == "CMD006"));
    }

    #[tokio::test]
    async fn test_command_missing_frontmatter() {
        let result = validate("# /x\n\nNo metadata.\n").await;
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.code == "CMD001"));
    }
}
