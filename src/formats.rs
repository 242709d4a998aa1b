use crate::constants::{EMBEDDED_SCRIPT_PATTERNS, SENSITIVE_PATHS, SHELL_INJECTION_PATTERNS};
use crate::models::ValidationResult;
use serde_json::Value;

/// Parse UTF-8 JSON text, reporting line and column on failure
pub fn validate_json(content: &str) -> (ValidationResult, Option<Value>) {
    let mut result = ValidationResult::new();

    if content.trim().is_empty() {
        result.error("JSON001", "file is empty");
        return (result, None);
    }

    match serde_json::from_str::<Value>(content) {
        Ok(value) => (result, Some(value)),
        Err(err) => {
            result.error_at(
                "JSON002",
                format!("invalid JSON at line {}, column {}: {err}", err.line(), err.column()),
                err.line(),
            );
            (result, None)
        }
    }
}

/// Parse the safe YAML subset. serde_yaml never resolves tags into code, so
/// anything it accepts is data only.
pub fn validate_yaml(content: &str) -> (ValidationResult, Option<serde_yaml::Value>) {
    let mut result = ValidationResult::new();

    match serde_yaml::from_str::<serde_yaml::Value>(content) {
        Ok(value) => {
            if value.is_null() && !content.trim().is_empty() {
                result.warn("YAML002", "YAML document parsed to null");
            }
            (result, Some(value))
        }
        Err(err) => {
            match err.location() {
                Some(loc) => result.error_at(
                    "YAML001",
                    format!("invalid YAML at line {}, column {}: {err}", loc.line(), loc.column()),
                    loc.line(),
                ),
                None => result.error("YAML001", format!("invalid YAML: {err}")),
            }
            (result, None)
        }
    }
}

/// Split a markdown document into its YAML frontmatter and body.
///
/// Frontmatter is present when the first line is exactly `---`; everything up
/// to the next `---` line is metadata.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return (None, content);
    };
    if first.trim_end() != "---" {
        return (None, content);
    }

    let mut offset = first.len();
    for line in lines {
        if line.trim_end() == "---" {
            let meta = &content[first.len()..offset];
            let body = &content[offset + line.len()..];
            return (Some(meta), body);
        }
        offset += line.len();
    }

    // Opening fence without a closing one: treat the whole file as body
    (None, content)
}

/// Validate markdown-with-frontmatter, returning the parsed metadata mapping
pub fn validate_markdown(content: &str) -> (ValidationResult, Option<serde_yaml::Mapping>, String) {
    let mut result = ValidationResult::new();
    let (meta, body) = split_frontmatter(content);

    let mapping = match meta {
        Some(raw) => {
            let (yaml_result, value) = validate_yaml(raw);
            result.merge(yaml_result);
            match value {
                Some(serde_yaml::Value::Mapping(map)) => Some(map),
                Some(_) => {
                    result.error("MD002", "frontmatter must be a YAML mapping");
                    None
                }
                None => None,
            }
        }
        None => {
            result.warn("MD001", "no frontmatter block found");
            None
        }
    };

    (result, mapping, body.to_string())
}

/// Shallow security scan over textual content.
///
/// Findings are warnings only; they never block installation on their own.
pub fn security_scan(content: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let lower = content.to_lowercase();

    for pattern in SHELL_INJECTION_PATTERNS {
        if content.contains(pattern) {
            result.warn(
                "SEC001",
                format!("possible shell injection pattern: {pattern:?}"),
            );
        }
    }

    for pattern in EMBEDDED_SCRIPT_PATTERNS {
        if lower.contains(&pattern.to_lowercase()) {
            result.warn("SEC002", format!("embedded script content: {pattern:?}"));
        }
    }

    for path in SENSITIVE_PATHS {
        if content.contains(path) {
            result.warn("SEC003", format!("references sensitive path {path}"));
        }
    }

    let non_text = content
        .bytes()
        .filter(|b| *b < 9 || (*b > 13 && *b < 32))
        .count();
    if !content.is_empty() && non_text * 100 / content.len() > 5 {
        result.warn("SEC004", "content contains raw binary data");
    }

    result
}
