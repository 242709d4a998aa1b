use crate::constants::MAX_EXTENSION_FILE_SIZE;
use crate::models::{ExtensionKind, ValidationResult};
use anyhow::Result;
use std::path::Path;

/// Trait for per-kind structural validators
#[async_trait::async_trait]
pub trait ExtensionValidator: Send + Sync {
    /// The extension kind this validator covers
    fn kind(&self) -> ExtensionKind;

    /// File extensions (without the dot) this validator accepts
    fn accepted_extensions(&self) -> &'static [&'static str];

    /// Validate one candidate file, collecting every issue
    async fn validate_file(&self, path: &Path) -> Result<ValidationResult>;
}

/// Checks shared by every validator: existence, size cap, accepted extension.
///
/// Returns the file content when the checks pass, or a result already
/// carrying the blocking errors.
pub async fn base_checks(
    path: &Path,
    accepted: &[&str],
) -> Result<(ValidationResult, Option<String>)> {
    let mut result = ValidationResult::new();

    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(_) => {
            result.error("BASE001", format!("file not found: {}", path.display()));
            return Ok((result, None));
        }
    };

    if !meta.is_file() {
        result.error("BASE002", format!("not a regular file: {}", path.display()));
        return Ok((result, None));
    }

    if meta.len() > MAX_EXTENSION_FILE_SIZE {
        result.error(
            "BASE003",
            format!("file exceeds {} byte limit", MAX_EXTENSION_FILE_SIZE),
        );
        return Ok((result, None));
    }

    match crate::utils::get_extension(path) {
        Some(ext) if accepted.contains(&ext.as_str()) => {}
        Some(ext) => {
            result.error(
                "BASE004",
                format!("unexpected file extension .{ext}, expected one of {accepted:?}"),
            );
            return Ok((result, None));
        }
        None => {
            result.error("BASE004", "file has no extension");
            return Ok((result, None));
        }
    }

    // Byte-level read so a bad encoding is a finding, not an IO failure
    let bytes = tokio::fs::read(path).await?;
    let bytes = match bytes.strip_prefix(b"\xef\xbb\xbf") {
        Some(stripped) => stripped.to_vec(),
        None => bytes,
    };
    match String::from_utf8(bytes) {
        Ok(content) => Ok((result, Some(content))),
        Err(err) => {
            result.error(
                "BASE005",
                format!("file is not valid UTF-8 (bad byte at offset {})", err.utf8_error().valid_up_to()),
            );
            Ok((result, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_base_checks_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let (result, content) = base_checks(&temp_dir.path().join("nope.json"), &["json"])
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors[0].code, "BASE001");
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_base_checks_wrong_extension() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hook.yaml");
        fs::write(&file, "name: x").unwrap();

        let (result, content) = base_checks(&file, &["json"]).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors[0].code, "BASE004");
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_base_checks_reads_content() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hook.json");
        fs::write(&file, "{}").unwrap();

        let (result, content) = base_checks(&file, &["json"]).await.unwrap();
        assert!(result.valid);
        assert_eq!(content.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_base_checks_strips_bom() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hook.json");
        fs::write(&file, b"\xef\xbb\xbf{}").unwrap();

        let (result, content) = base_checks(&file, &["json"]).await.unwrap();
        assert!(result.valid);
        assert_eq!(content.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_base_checks_rejects_bad_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hook.json");
        fs::write(&file, b"{\"name\": \"\xff\xfe\"}").unwrap();

        let (result, content) = base_checks(&file, &["json"]).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors[0].code, "BASE005");
        assert!(content.is_none());
    }
}
