use crate::config::PaccConfig;
use crate::constants::PROJECT_MANIFEST;
use crate::installer::{InstallOptions, Installer, SelectAll};
use crate::models::{ExtensionKind, ScopePaths, ValidationResult};
use crate::settings::SettingsStore;
use crate::sources::SourceResolver;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One declarative extension entry in `pacc.json`: an order to install,
/// not a record of something installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSpec {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Git ref to check out for remote sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_structure: Option<bool>,
}

impl ExtensionSpec {
    /// True when the source is a local path rather than a URL or repo id
    pub fn is_local(&self) -> bool {
        !self.source.starts_with("https://")
            && !self.source.starts_with("git@")
            && !self.source.ends_with(".git")
            && crate::git::parse_repo_url(&self.source)
                .map_or(true, |_| self.source.contains('.') || self.source.starts_with('.'))
    }

    /// Local sources resolve relative to the project root
    pub fn resolved_source(&self, project_root: &Path) -> String {
        if self.is_local() && !Path::new(&self.source).is_absolute() {
            project_root.join(&self.source).to_string_lossy().to_string()
        } else {
            self.source.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EnvironmentOverlay {
    #[serde(default)]
    pub extensions: BTreeMap<String, Vec<ExtensionSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestMetadata {
    pub created_at: String,
    pub last_updated: String,
    pub pacc_version: String,
}

impl ManifestMetadata {
    fn now() -> Self {
        let stamp = chrono::Utc::now().to_rfc3339();
        Self {
            created_at: stamp.clone(),
            last_updated: stamp,
            pacc_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The `pacc.json` project manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub extensions: BTreeMap<String, Vec<ExtensionSpec>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, EnvironmentOverlay>,
    pub metadata: ManifestMetadata,
}

impl ProjectManifest {
    pub fn new(name: &str, version: &str, description: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description,
            extensions: BTreeMap::new(),
            environments: BTreeMap::new(),
            metadata: ManifestMetadata::now(),
        }
    }

    pub fn manifest_path(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_MANIFEST)
    }

    pub fn load(project_root: &Path) -> Result<Self> {
        let path = Self::manifest_path(project_root);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("No project manifest at {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(manifest)
    }

    /// Write the manifest, refusing to commit one that fails validation (I7)
    pub fn save(&self, project_root: &Path) -> Result<()> {
        let result = self.validate();
        if !result.valid {
            let first = result
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            bail!("refusing to write invalid pacc.json: {first}");
        }

        let path = Self::manifest_path(project_root);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Create a fresh manifest on disk; fails when one already exists
    pub fn init(project_root: &Path, name: &str, version: &str, description: Option<String>) -> Result<Self> {
        let path = Self::manifest_path(project_root);
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        let manifest = Self::new(name, version, description);
        manifest.save(project_root)?;
        Ok(manifest)
    }

    /// Structural validation: required fields, semver grammar, duplicate
    /// names, resolvable dependencies, and safe targetDir values.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.name.trim().is_empty() {
            result.error("PROJ001", "project name must not be empty");
        }
        if semver::Version::parse(&self.version).is_err() {
            result.error(
                "PROJ002",
                format!("project version {:?} is not valid semver", self.version),
            );
        }

        let mut all_names = Vec::new();
        for (kind_key, specs) in &self.extensions {
            if ExtensionKind::from_str(kind_key).is_err() {
                result.error("PROJ003", format!("unknown extension kind {kind_key:?}"));
            }
            let mut seen = std::collections::HashSet::new();
            for spec in specs {
                all_names.push(spec.name.clone());
                if !seen.insert(spec.name.clone()) {
                    result.error(
                        "PROJ004",
                        format!("duplicate {kind_key} entry {:?}", spec.name),
                    );
                }
                self.validate_spec(kind_key, spec, &mut result);
            }
        }

        for overlay in self.environments.values() {
            for (kind_key, specs) in &overlay.extensions {
                if ExtensionKind::from_str(kind_key).is_err() {
                    result.error("PROJ003", format!("unknown extension kind {kind_key:?}"));
                }
                for spec in specs {
                    all_names.push(spec.name.clone());
                    self.validate_spec(kind_key, spec, &mut result);
                }
            }
        }

        // Every declared dependency must name another spec
        for (kind_key, specs) in &self.extensions {
            for spec in specs {
                for dep in &spec.dependencies {
                    if !all_names.contains(dep) {
                        result.error(
                            "PROJ007",
                            format!(
                                "{kind_key} {:?} depends on {dep:?}, which is not declared",
                                spec.name
                            ),
                        );
                    }
                }
            }
        }

        result
    }

    fn validate_spec(&self, kind_key: &str, spec: &ExtensionSpec, result: &mut ValidationResult) {
        if spec.name.trim().is_empty() {
            result.error("PROJ005", format!("a {kind_key} entry has an empty name"));
        }
        if spec.source.trim().is_empty() {
            result.error(
                "PROJ005",
                format!("{kind_key} {:?} has an empty source", spec.name),
            );
        }
        if let Some(version) = &spec.version {
            if semver::Version::parse(version).is_err() {
                result.error(
                    "PROJ006",
                    format!("{kind_key} {:?} version {version:?} is not valid semver", spec.name),
                );
            }
        }
        if let Some(target) = &spec.target_dir {
            let path = Path::new(target);
            if target.is_empty() || path.is_absolute() || crate::utils::has_parent_segments(path) {
                result.error(
                    "PROJ008",
                    format!(
                        "{kind_key} {:?} targetDir {target:?} must be relative without '..'",
                        spec.name
                    ),
                );
            }
        }
    }

    /// Base extensions merged with an environment's overlay; overlay entries
    /// override base entries of the same name.
    pub fn effective_extensions(
        &self,
        environment: Option<&str>,
    ) -> BTreeMap<ExtensionKind, Vec<ExtensionSpec>> {
        let mut merged: BTreeMap<ExtensionKind, Vec<ExtensionSpec>> = BTreeMap::new();
        for (kind_key, specs) in &self.extensions {
            if let Ok(kind) = ExtensionKind::from_str(kind_key) {
                merged.entry(kind).or_default().extend(specs.clone());
            }
        }

        if let Some(env) = environment {
            if let Some(overlay) = self.environments.get(env) {
                for (kind_key, specs) in &overlay.extensions {
                    let Ok(kind) = ExtensionKind::from_str(kind_key) else {
                        continue;
                    };
                    let entry = merged.entry(kind).or_default();
                    for spec in specs {
                        entry.retain(|existing| existing.name != spec.name);
                        entry.push(spec.clone());
                    }
                }
            }
        }
        merged
    }

    /// Add a spec under a kind, replacing an entry of the same name
    pub fn upsert_spec(&mut self, kind: ExtensionKind, spec: ExtensionSpec) {
        let entry = self.extensions.entry(kind.settings_key().to_string()).or_default();
        entry.retain(|existing| existing.name != spec.name);
        entry.push(spec);
        self.metadata.last_updated = chrono::Utc::now().to_rfc3339();
    }

    /// Remove a spec by name; true when something was removed
    pub fn remove_spec(&mut self, kind: ExtensionKind, name: &str) -> bool {
        let Some(entry) = self.extensions.get_mut(kind.settings_key()) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|spec| spec.name != name);
        let removed = entry.len() != before;
        if removed {
            self.metadata.last_updated = chrono::Utc::now().to_rfc3339();
        }
        removed
    }
}

/// Per-spec outcome of a sync run
#[derive(Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Installed,
    Skipped,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<(String, SyncStatus)>,
}

impl SyncReport {
    pub fn success(&self) -> bool {
        self.results
            .iter()
            .all(|(_, status)| !matches!(status, SyncStatus::Failed(_)))
    }

    pub fn installed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, s)| *s == SyncStatus::Installed)
            .count()
    }
}

/// Declarative apply: make the project scope match the manifest
pub struct SyncEngine {
    config: PaccConfig,
}

impl SyncEngine {
    pub fn new(config: PaccConfig) -> Self {
        Self { config }
    }

    pub async fn sync(
        &self,
        project_root: &Path,
        environment: Option<&str>,
        dry_run: bool,
    ) -> Result<SyncReport> {
        let manifest = ProjectManifest::load(project_root)?;
        let validation = manifest.validate();
        if !validation.valid {
            let first = validation
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            bail!("pacc.json is invalid: {first}");
        }
        if let Some(env) = environment {
            if !manifest.environments.contains_key(env) {
                bail!("environment {env:?} is not defined in pacc.json");
            }
        }

        let paths = ScopePaths::project(project_root);
        let store = SettingsStore::new(paths.settings_path(), self.config.lock.clone());
        let installer = Installer::new(paths, store);
        let resolver = SourceResolver::new(self.config.clone());
        let installed = installer.store().load()?;

        let mut report = SyncReport::default();
        let mut pending: Vec<(ExtensionKind, ExtensionSpec)> = Vec::new();
        for (kind, specs) in manifest.effective_extensions(environment) {
            for spec in specs {
                // Idempotence: an install at the requested (or newer) version
                // is left alone.
                if let Some(existing) = installed.find(kind, &spec.name) {
                    if version_satisfied(spec.version.as_deref(), &existing.version) {
                        report.results.push((spec.name.clone(), SyncStatus::Skipped));
                        continue;
                    }
                }
                pending.push((kind, spec));
            }
        }

        // Stage every source concurrently; only the install commits are
        // serialized, and those alone take the scope lock.
        let stagings = futures::future::join_all(pending.iter().map(|(kind, spec)| {
            let resolver = &resolver;
            async move {
                let source = spec.resolved_source(project_root);
                resolver
                    .resolve_at(&source, Some(*kind), Some(project_root), spec.r#ref.as_deref())
                    .await
            }
        }))
        .await;

        for ((kind, spec), staged) in pending.iter().zip(stagings) {
            let status = match staged {
                Ok(staged) => self.install_staged(&installer, *kind, spec, &staged, dry_run),
                Err(err) => SyncStatus::Failed(format!("{err:#}")),
            };
            report.results.push((spec.name.clone(), status));
        }
        Ok(report)
    }

    fn install_staged(
        &self,
        installer: &Installer,
        kind: ExtensionKind,
        spec: &ExtensionSpec,
        staged: &crate::sources::StagedSource,
        dry_run: bool,
    ) -> SyncStatus {
        let options = InstallOptions {
            // A re-sync at a new version overwrites the previous install
            force: true,
            dry_run,
            kind_filter: Some(kind),
            target_dir: spec.target_dir.clone(),
            preserve_structure: spec.preserve_structure.unwrap_or(false),
            dependencies: spec.dependencies.clone(),
            version_override: spec.version.clone(),
            ..Default::default()
        };

        match installer.install(staged, &options, &SelectAll) {
            Ok(_) => SyncStatus::Installed,
            Err(err) => SyncStatus::Failed(format!("{err:#}")),
        }
    }
}

/// True when an installed version satisfies a requested one: no request
/// means any install counts, otherwise installed must be equal or newer.
fn version_satisfied(requested: Option<&str>, installed: &str) -> bool {
    let Some(requested) = requested else {
        return true;
    };
    match (
        semver::Version::parse(requested),
        semver::Version::parse(installed),
    ) {
        (Ok(want), Ok(have)) => have >= want,
        _ => requested == installed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spec(name: &str, source: &str) -> ExtensionSpec {
        ExtensionSpec {
            name: name.to_string(),
            source: source.to_string(),
            version: None,
            r#ref: None,
            environment: None,
            dependencies: Vec::new(),
            target_dir: None,
            preserve_structure: None,
        }
    }

    const HOOK_Y: &str = r#"{"name": "y", "version": "1.0.0", "description": "d",
        "eventTypes": ["Stop"], "commands": ["echo y"]}"#;
    const AGENT_X: &str = "---\nname: x\ndescription: base agent\nmodel: sonnet\n---\nBody\n";

    #[test]
    fn test_manifest_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut manifest = ProjectManifest::new("demo", "1.0.0", Some("A demo".into()));
        manifest.upsert_spec(ExtensionKind::Hook, spec("y", "./y.json"));
        manifest.save(dir.path()).unwrap();

        let loaded = ProjectManifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_init_refuses_existing() {
        let dir = TempDir::new().unwrap();
        ProjectManifest::init(dir.path(), "demo", "1.0.0", None).unwrap();
        assert!(ProjectManifest::init(dir.path(), "demo", "1.0.0", None).is_err());
    }

    #[test]
    fn test_validate_semver_and_duplicates() {
        let mut manifest = ProjectManifest::new("demo", "not-a-version", None);
        manifest
            .extensions
            .insert("hooks".into(), vec![spec("y", "./y.json"), spec("y", "./y2.json")]);

        let result = manifest.validate();
        assert!(!result.valid);
        let codes: Vec<_> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert!(codes.contains(&"PROJ002"));
        assert!(codes.contains(&"PROJ004"));
    }

    #[test]
    fn test_validate_rejects_traversal_target_dir() {
        let mut manifest = ProjectManifest::new("demo", "1.0.0", None);
        let mut bad = spec("y", "./y.json");
        bad.target_dir = Some("../outside".into());
        manifest.extensions.insert("hooks".into(), vec![bad]);

        let result = manifest.validate();
        assert!(result.errors.iter().any(|e| e.code == "PROJ008"));
    }

    #[test]
    fn test_validate_unresolved_dependency() {
        let mut manifest = ProjectManifest::new("demo", "1.0.0", None);
        let mut dependent = spec("y", "./y.json");
        dependent.dependencies = vec!["missing".into()];
        manifest.extensions.insert("hooks".into(), vec![dependent]);

        let result = manifest.validate();
        assert!(result.errors.iter().any(|e| e.code == "PROJ007"));
    }

    #[test]
    fn test_save_refuses_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = ProjectManifest::new("demo", "nope", None);
        assert!(manifest.save(dir.path()).is_err());
        assert!(!ProjectManifest::manifest_path(dir.path()).exists());
    }

    #[test]
    fn test_environment_overlay_overrides_by_name() {
        let mut manifest = ProjectManifest::new("demo", "1.0.0", None);
        let mut base = spec("x", "./x.md");
        base.version = Some("1.0.0".into());
        manifest.extensions.insert("agents".into(), vec![base]);

        let mut dev_x = spec("x", "./x-dev.md");
        dev_x.version = Some("2.0.0".into());
        let mut overlay = EnvironmentOverlay::default();
        overlay.extensions.insert("agents".into(), vec![dev_x]);
        overlay.extensions.insert("hooks".into(), vec![spec("y", "./y.json")]);
        manifest.environments.insert("dev".into(), overlay);

        let base_only = manifest.effective_extensions(None);
        assert_eq!(base_only[&ExtensionKind::Agent].len(), 1);
        assert_eq!(base_only[&ExtensionKind::Agent][0].source, "./x.md");
        assert!(!base_only.contains_key(&ExtensionKind::Hook));

        let dev = manifest.effective_extensions(Some("dev"));
        assert_eq!(dev[&ExtensionKind::Agent][0].source, "./x-dev.md");
        assert_eq!(dev[&ExtensionKind::Hook].len(), 1);
    }

    #[test]
    fn test_upsert_and_remove_spec() {
        let mut manifest = ProjectManifest::new("demo", "1.0.0", None);
        manifest.upsert_spec(ExtensionKind::Hook, spec("y", "./y.json"));
        manifest.upsert_spec(ExtensionKind::Hook, spec("y", "./y-moved.json"));

        let hooks = &manifest.extensions["hooks"];
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].source, "./y-moved.json");

        assert!(manifest.remove_spec(ExtensionKind::Hook, "y"));
        assert!(!manifest.remove_spec(ExtensionKind::Hook, "y"));
        assert!(manifest.extensions["hooks"].is_empty());
    }

    #[test]
    fn test_validate_unknown_kind_key() {
        let mut manifest = ProjectManifest::new("demo", "1.0.0", None);
        manifest.extensions.insert("widgets".into(), vec![spec("w", "./w.json")]);
        let result = manifest.validate();
        assert!(result.errors.iter().any(|e| e.code == "PROJ003"));
    }

    #[test]
    fn test_version_satisfied() {
        assert!(version_satisfied(None, "0.1.0"));
        assert!(version_satisfied(Some("1.0.0"), "1.0.0"));
        assert!(version_satisfied(Some("1.0.0"), "1.2.0"));
        assert!(!version_satisfied(Some("2.0.0"), "1.2.0"));
    }

    fn write_project(dir: &Path) {
        fs::write(dir.join("x.md"), AGENT_X).unwrap();
        fs::write(dir.join("y.json"), HOOK_Y).unwrap();

        let mut manifest = ProjectManifest::new("demo", "1.0.0", None);
        let mut base = spec("x", "./x.md");
        base.version = Some("1.0.0".into());
        manifest.extensions.insert("agents".into(), vec![base]);

        let mut overlay = EnvironmentOverlay::default();
        let mut hook = spec("y", "./y.json");
        hook.version = Some("1.0.0".into());
        overlay.extensions.insert("hooks".into(), vec![hook]);
        manifest.environments.insert("dev".into(), overlay);
        manifest.save(dir).unwrap();
    }

    #[tokio::test]
    async fn test_sync_base_then_environment() {
        let project = TempDir::new().unwrap();
        write_project(project.path());
        let engine = SyncEngine::new(PaccConfig::default());

        // Base sync installs only the agent
        let report = engine.sync(project.path(), None, false).await.unwrap();
        assert!(report.success());
        assert_eq!(report.installed_count(), 1);
        assert!(project.path().join(".claude/agents/x.md").exists());
        assert!(!project.path().join(".claude/hooks/y.json").exists());

        // The dev environment adds the hook
        let report = engine.sync(project.path(), Some("dev"), false).await.unwrap();
        assert!(report.success());
        assert!(project.path().join(".claude/hooks/y.json").exists());
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let project = TempDir::new().unwrap();
        write_project(project.path());
        let engine = SyncEngine::new(PaccConfig::default());

        let first = engine.sync(project.path(), Some("dev"), false).await.unwrap();
        assert_eq!(first.installed_count(), 2);

        let second = engine.sync(project.path(), Some("dev"), false).await.unwrap();
        assert!(second.success());
        assert_eq!(second.installed_count(), 0);
        assert_eq!(
            second
                .results
                .iter()
                .filter(|(_, s)| *s == SyncStatus::Skipped)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_sync_unknown_environment_fails() {
        let project = TempDir::new().unwrap();
        write_project(project.path());
        let engine = SyncEngine::new(PaccConfig::default());
        assert!(engine.sync(project.path(), Some("prod"), false).await.is_err());
    }

    #[tokio::test]
    async fn test_sync_reports_missing_source() {
        let project = TempDir::new().unwrap();
        write_project(project.path());
        fs::remove_file(project.path().join("x.md")).unwrap();

        let engine = SyncEngine::new(PaccConfig::default());
        let report = engine.sync(project.path(), None, false).await.unwrap();
        assert!(!report.success());
        assert!(matches!(report.results[0].1, SyncStatus::Failed(_)));
    }
}
