use crate::constants::MAX_FRAGMENT_CONTENT_SIZE;
use crate::formats::{security_scan, validate_markdown};
use crate::models::ValidationResult;
use anyhow::Result;
use serde_json::Value;
use serde_yaml::Mapping;
use std::path::Path;

/// Validator for context fragments, a secondary markdown-with-metadata kind.
///
/// Fragments are installed by an auxiliary subsystem; they share the settings
/// store and install engine contracts but are not one of the four extension
/// kinds.
pub struct FragmentValidator;

impl FragmentValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_frontmatter(&self, meta: &Mapping, result: &mut ValidationResult) {
        for field in ["title", "description"] {
            match meta.get(field) {
                Some(value) => match value.as_str() {
                    Some(text) => result.set_meta(field, Value::String(text.to_string())),
                    None => result.error("FRAG002", format!("{field} must be a string")),
                },
                None => result.warn("FRAG003", format!("no {field} provided")),
            }
        }

        // Tags accept either a YAML list or a comma-separated string
        if let Some(tags) = meta.get("tags") {
            let parsed: Option<Vec<String>> = match tags {
                serde_yaml::Value::Sequence(items) => items
                    .iter()
                    .map(|t| t.as_str().map(str::to_string))
                    .collect(),
                serde_yaml::Value::String(joined) => Some(
                    joined
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect(),
                ),
                _ => None,
            };
            match parsed {
                Some(tags) => {
                    let values = tags.into_iter().map(Value::String).collect();
                    result.set_meta("tags", Value::Array(values));
                }
                None => result.error("FRAG004", "tags must be a list or a comma-separated string"),
            }
        }
    }

    pub async fn validate_file(&self, path: &Path) -> Result<ValidationResult> {
        let (mut result, content) =
            crate::validators::r#trait::base_checks(path, &["md", "markdown"]).await?;
        let Some(content) = content else {
            return Ok(result);
        };

        let (md_result, mapping, body) = validate_markdown(&content);
        result.merge(md_result);
        if let Some(meta) = mapping {
            self.check_frontmatter(&meta, &mut result);
        }

        if body.trim().is_empty() {
            result.error("FRAG001", "fragment body is empty");
        } else if body.len() > MAX_FRAGMENT_CONTENT_SIZE {
            result.error(
                "FRAG005",
                format!("fragment body exceeds {MAX_FRAGMENT_CONTENT_SIZE} bytes"),
            );
        } else if body.trim().len() < 10 {
            result.warn("FRAG006", "fragment body is very short");
        }

        result.merge(security_scan(&content));
        Ok(result)
    }
}
