use crate::models::{ExtensionKind, PluginManifest, ValidationResult};
use crate::utils::walk_files;
use crate::validators::registry::ValidatorRegistry;
use anyhow::Result;
use serde_json::Value;
use std::path::Path;

/// Validator for plugin bundles: a directory with a `plugin.json` manifest
/// and at least one component subdirectory.
pub struct PluginValidator {
    registry: ValidatorRegistry,
}

impl PluginValidator {
    pub fn new() -> Self {
        Self {
            registry: ValidatorRegistry::new(),
        }
    }

    /// Parse and check the `plugin.json` manifest
    fn check_manifest(&self, raw: &str, result: &mut ValidationResult) -> Option<PluginManifest> {
        let (json_result, doc) = crate::formats::validate_json(raw);
        result.merge(json_result);
        let doc = doc?;

        let Some(obj) = doc.as_object() else {
            result.error("PLUGIN002", "plugin.json must be a JSON object");
            return None;
        };

        let name = match obj.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                result.error("PLUGIN003", "plugin.json missing required field: name");
                return None;
            }
        };
        let version = match obj.get("version").and_then(Value::as_str) {
            Some(version) => version.to_string(),
            None => {
                result.error("PLUGIN004", "plugin.json missing required field: version");
                return None;
            }
        };

        let manifest = PluginManifest {
            name,
            version,
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            author: obj.get("author").and_then(Value::as_str).map(str::to_string),
        };
        result.set_meta("name", Value::String(manifest.name.clone()));
        result.set_meta("version", Value::String(manifest.version.clone()));
        Some(manifest)
    }

    /// Validate a plugin directory, recursing into its component files
    pub async fn validate_dir(&self, dir: &Path) -> Result<(ValidationResult, Option<PluginManifest>)> {
        let mut result = ValidationResult::new();

        if !dir.is_dir() {
            result.error("PLUGIN001", format!("not a directory: {}", dir.display()));
            return Ok((result, None));
        }

        let manifest_path = dir.join("plugin.json");
        let manifest = if manifest_path.is_file() {
            let raw = crate::utils::read_text(&manifest_path)?;
            self.check_manifest(&raw, &mut result)
        } else {
            result.error(
                "PLUGIN001",
                format!("missing plugin.json in {}", dir.display()),
            );
            None
        };

        let mut component_count = 0usize;
        for kind in ExtensionKind::ALL {
            let component_dir = dir.join(kind.dir_name());
            if !component_dir.is_dir() {
                continue;
            }
            let validator = self.registry.get(kind);
            let files = walk_files(&component_dir, Some(validator.accepted_extensions()), false);
            for file in files {
                component_count += 1;
                let mut component = validator.validate_file(&file).await?;
                // Anchor issues to the file they came from
                for issue in component
                    .errors
                    .iter_mut()
                    .chain(component.warnings.iter_mut())
                {
                    if issue.file.is_none() {
                        issue.file = Some(file.display().to_string());
                    }
                }
                result.valid = result.valid && component.valid;
                result.errors.extend(component.errors);
                result.warnings.extend(component.warnings);
            }
        }

        if component_count == 0 {
            result.error(
                "PLUGIN005",
                "plugin has no components; expected at least one of commands/, agents/, hooks/, mcps/",
            );
        }
        result.set_meta("components", Value::from(component_count));

        Ok((result, manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_plugin(dir: &Path, manifest: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("plugin.json"), manifest).unwrap();
    }

    #[tokio::test]
    async fn test_valid_plugin_with_hook_component() {
        let temp_dir = TempDir::new().unwrap();
        let plugin = temp_dir.path().join("tools");
        write_plugin(&plugin, r#"{"name": "tools", "version": "1.0.0", "author": "acme"}"#);
        fs::create_dir_all(plugin.join("hooks")).unwrap();
        fs::write(
            plugin.join("hooks/fmt.json"),
            r#"{"name": "fmt", "version": "1.0.0", "description": "d", "eventTypes": ["Stop"], "commands": ["make fmt"]}"#,
        )
        .unwrap();

        let (result, manifest) = PluginValidator::new().validate_dir(&plugin).await.unwrap();
        assert!(result.valid, "errors: {:?}", result.errors);
        assert_eq!(manifest.unwrap().name, "tools");
    }

    #[tokio::test]
    async fn test_plugin_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let plugin = temp_dir.path().join("empty");
        fs::create_dir_all(plugin.join("commands")).unwrap();

        let (result, manifest) = PluginValidator::new().validate_dir(&plugin).await.unwrap();
        assert!(!result.valid);
        assert!(manifest.is_none());
        assert!(result.errors.iter().any(|e| e.code == "PLUGIN001"));
    }

    #[tokio::test]
    async fn test_plugin_without_components() {
        let temp_dir = TempDir::new().unwrap();
        let plugin = temp_dir.path().join("bare");
        write_plugin(&plugin, r#"{"name": "bare", "version": "0.1.0"}"#);

        let (result, _) = PluginValidator::new().validate_dir(&plugin).await.unwrap();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.code == "PLUGIN005"));
    }

    #[tokio::test]
    async fn test_plugin_component_errors_carry_file() {
        let temp_dir = TempDir::new().unwrap();
        let plugin = temp_dir.path().join("p");
        write_plugin(&plugin, r#"{"name": "p", "version": "1.0.0"}"#);
        fs::create_dir_all(plugin.join("hooks")).unwrap();
        fs::write(plugin.join("hooks/broken.json"), r#"{"name": "broken"}"#).unwrap();

        let (result, _) = PluginValidator::new().validate_dir(&plugin).await.unwrap();
        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.file.as_deref().is_some_and(|f| f.ends_with("broken.json"))));
    }
}
