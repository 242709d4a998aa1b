pub mod url;

use crate::config::PaccConfig;
use crate::detector::{detect, scan_directory};
use crate::git::{clone_url, parse_repo_url, Git};
use crate::models::{ExtensionKind, ValidationResult};
use crate::validators::ValidatorRegistry;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// How a user-supplied source string was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    LocalFile,
    LocalDir,
    Url,
    Git,
}

/// One file staged for installation, with its detected kind and validation
#[derive(Debug)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: ExtensionKind,
    pub name: String,
    pub version: String,
    pub result: ValidationResult,
}

/// A resolved source: candidates rooted in a directory the install engine
/// can commit from. Holding the value keeps any staging directory alive.
#[derive(Debug)]
pub struct StagedSource {
    pub origin: String,
    pub source_kind: SourceKind,
    pub root: PathBuf,
    pub candidates: Vec<Candidate>,
    /// Files that failed validation, kept for reporting
    pub rejected: Vec<Candidate>,
    /// Files no detector tier could classify
    pub unknown: Vec<PathBuf>,
    _staging: Option<TempDir>,
}

/// Normalizes any supported source to a set of validated candidates
pub struct SourceResolver {
    registry: ValidatorRegistry,
    config: PaccConfig,
}

impl SourceResolver {
    pub fn new(config: PaccConfig) -> Self {
        Self {
            registry: ValidatorRegistry::new(),
            config,
        }
    }

    /// Resolve a source argument: local path, HTTPS URL, or Git identifier.
    ///
    /// `kind_override` pins the kind instead of consulting the detector;
    /// `project_root` feeds the detector's declaration tier.
    pub async fn resolve(
        &self,
        source: &str,
        kind_override: Option<ExtensionKind>,
        project_root: Option<&Path>,
    ) -> Result<StagedSource> {
        self.resolve_at(source, kind_override, project_root, None).await
    }

    /// `resolve`, additionally checking out a Git ref for repository sources
    pub async fn resolve_at(
        &self,
        source: &str,
        kind_override: Option<ExtensionKind>,
        project_root: Option<&Path>,
        git_ref: Option<&str>,
    ) -> Result<StagedSource> {
        let as_path = PathBuf::from(shellexpand::tilde(source).as_ref());
        if as_path.exists() {
            return self.resolve_local(source, &as_path, kind_override, project_root).await;
        }

        if source.starts_with("https://") && !looks_like_git(source) {
            return self.resolve_url(source, kind_override).await;
        }

        if looks_like_git(source) || parse_repo_url(source).is_some() {
            return self.resolve_git(source, kind_override, git_ref).await;
        }

        bail!("source not found: {source} is neither a local path, an https URL, nor a Git repository");
    }

    async fn resolve_local(
        &self,
        origin: &str,
        path: &Path,
        kind_override: Option<ExtensionKind>,
        project_root: Option<&Path>,
    ) -> Result<StagedSource> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;

        if path.is_file() {
            let (candidates, rejected, unknown) = self
                .validate_files(vec![path.clone()], kind_override, project_root)
                .await?;
            return Ok(StagedSource {
                origin: origin.to_string(),
                source_kind: SourceKind::LocalFile,
                root: path.parent().unwrap_or(&path).to_path_buf(),
                candidates,
                rejected,
                unknown,
                _staging: None,
            });
        }

        let (grouped, mut unplaced) = scan_directory(&path, project_root.or(Some(&path)));
        let mut files = Vec::new();
        match kind_override {
            Some(kind) => {
                // With an explicit type, every scanned candidate of that kind
                // plus the unclassified files are offered to its validator.
                files.extend(grouped.get(&kind).cloned().unwrap_or_default());
                files.append(&mut unplaced);
                unplaced = Vec::new();
            }
            None => {
                for (_, mut group) in grouped {
                    files.append(&mut group);
                }
            }
        }

        let (candidates, rejected, unknown_from_validation) = self
            .validate_files(files, kind_override, project_root.or(Some(&path)))
            .await?;
        unplaced.extend(unknown_from_validation);

        Ok(StagedSource {
            origin: origin.to_string(),
            source_kind: SourceKind::LocalDir,
            root: path,
            candidates,
            rejected,
            unknown: unplaced,
            _staging: None,
        })
    }

    async fn resolve_url(
        &self,
        source: &str,
        kind_override: Option<ExtensionKind>,
    ) -> Result<StagedSource> {
        let staging = TempDir::new().context("Failed to create staging directory")?;
        let fetched = url::fetch_to(source, staging.path(), &self.config.fetch).await?;

        let (candidates, rejected, unknown) =
            self.validate_files(vec![fetched], kind_override, None).await?;

        Ok(StagedSource {
            origin: source.to_string(),
            source_kind: SourceKind::Url,
            root: staging.path().to_path_buf(),
            candidates,
            rejected,
            unknown,
            _staging: Some(staging),
        })
    }

    async fn resolve_git(
        &self,
        source: &str,
        kind_override: Option<ExtensionKind>,
        git_ref: Option<&str>,
    ) -> Result<StagedSource> {
        let staging = TempDir::new().context("Failed to create staging directory")?;
        let url = clone_url(source);
        let git = Git::new(&self.config.git);
        let checkout = staging.path().join("checkout");

        // A pinned ref needs full history to land on
        match git_ref {
            Some(rev) => {
                git.clone_full(&url, &checkout)
                    .await
                    .with_context(|| format!("Failed to clone {source}"))?;
                git.checkout(&checkout, rev)
                    .await
                    .with_context(|| format!("Failed to check out {rev} in {source}"))?;
            }
            None => {
                git.clone(&url, &checkout)
                    .await
                    .with_context(|| format!("Failed to clone {source}"))?;
            }
        }

        let (grouped, unplaced) = scan_directory(&checkout, Some(&checkout));
        let mut files = Vec::new();
        for (kind, group) in grouped {
            if kind_override.is_none() || kind_override == Some(kind) {
                files.extend(group);
            }
        }

        let (candidates, rejected, unknown_from_validation) = self
            .validate_files(files, kind_override, Some(&checkout))
            .await?;
        let mut unknown = unplaced;
        unknown.extend(unknown_from_validation);

        Ok(StagedSource {
            origin: source.to_string(),
            source_kind: SourceKind::Git,
            root: checkout,
            candidates,
            rejected,
            unknown,
            _staging: Some(staging),
        })
    }

    /// Validate a batch concurrently, splitting passes from failures
    async fn validate_files(
        &self,
        files: Vec<PathBuf>,
        kind_override: Option<ExtensionKind>,
        project_root: Option<&Path>,
    ) -> Result<(Vec<Candidate>, Vec<Candidate>, Vec<PathBuf>)> {
        let mut tagged = Vec::new();
        let mut unknown = Vec::new();
        for file in files {
            match kind_override.or_else(|| detect(&file, project_root)) {
                Some(kind) => tagged.push((file, kind)),
                None => unknown.push(file),
            }
        }

        let checks = tagged.into_iter().map(|(file, kind)| {
            let validator = self.registry.get(kind);
            async move {
                let result = validator.validate_file(&file).await?;
                anyhow::Ok(build_candidate(file, kind, result))
            }
        });

        let mut candidates = Vec::new();
        let mut rejected = Vec::new();
        for outcome in futures::future::join_all(checks).await {
            let candidate = outcome?;
            if candidate.result.valid {
                candidates.push(candidate);
            } else {
                rejected.push(candidate);
            }
        }
        Ok((candidates, rejected, unknown))
    }
}

fn build_candidate(path: PathBuf, kind: ExtensionKind, result: ValidationResult) -> Candidate {
    let name = result
        .meta_str("name")
        .map(str::to_string)
        .or_else(|| crate::utils::file_stem(&path))
        .unwrap_or_else(|| "unnamed".to_string());
    let version = result
        .meta_str("version")
        .unwrap_or("0.0.0")
        .to_string();
    Candidate {
        path,
        kind,
        name,
        version,
        result,
    }
}

fn looks_like_git(source: &str) -> bool {
    source.ends_with(".git")
        || source.starts_with("git@")
        || source.starts_with("git+ssh://")
        || source.starts_with("ssh://")
}
