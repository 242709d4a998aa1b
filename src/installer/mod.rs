pub mod rewind;

use crate::models::{
    ExtensionKind, ExtensionRecord, ScopePaths, SettingsDoc, ValidationStatus,
};
use crate::settings::SettingsStore;
use crate::sources::{Candidate, StagedSource};
use crate::utils::{has_parent_segments, is_contained};
use anyhow::{bail, Context, Result};
use rewind::RewindLog;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Seam for interactive candidate selection and confirmations.
///
/// The CLI provides a dialoguer-backed implementation; everything else uses
/// the non-interactive default, which selects all and answers yes.
pub trait Selector {
    fn select(&self, prompt: &str, items: &[String]) -> Result<Vec<usize>>;
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Non-interactive selector: take everything, confirm everything
pub struct SelectAll;

impl Selector for SelectAll {
    fn select(&self, _prompt: &str, items: &[String]) -> Result<Vec<usize>> {
        Ok((0..items.len()).collect())
    }

    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub force: bool,
    pub dry_run: bool,
    pub interactive: bool,
    pub strict: bool,
    /// Install only candidates of this kind
    pub kind_filter: Option<ExtensionKind>,
    /// Extra directory beneath the kind's install directory
    pub target_dir: Option<String>,
    /// Replicate the source directory layout beneath the target
    pub preserve_structure: bool,
    /// Dependency names stamped onto every installed record
    pub dependencies: Vec<String>,
    /// Version recorded instead of the candidate's own, when given
    pub version_override: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub force: bool,
    pub dry_run: bool,
    pub kind: Option<ExtensionKind>,
}

/// What an install did (or, under dry-run, would do)
#[derive(Debug, Default)]
pub struct InstallOutcome {
    pub installed: Vec<ExtensionRecord>,
    pub skipped: Vec<String>,
    pub dry_run: bool,
}

/// What a remove did (or would do)
#[derive(Debug)]
pub struct RemoveOutcome {
    pub record: ExtensionRecord,
    pub removed_file: PathBuf,
    pub dry_run: bool,
}

/// Two-phase install/remove engine over one scope.
///
/// The file-system phase always precedes the config phase, so an interrupted
/// operation leaves an orphan file rather than a dangling record; failures
/// replay the rewind log and restore the settings backup.
pub struct Installer {
    paths: ScopePaths,
    store: SettingsStore,
}

impl Installer {
    pub fn new(paths: ScopePaths, store: SettingsStore) -> Self {
        Self { paths, store }
    }

    pub fn scope_paths(&self) -> &ScopePaths {
        &self.paths
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// Install selected candidates from a staged source
    pub fn install(
        &self,
        staged: &StagedSource,
        options: &InstallOptions,
        selector: &dyn Selector,
    ) -> Result<InstallOutcome> {
        let mut outcome = InstallOutcome {
            dry_run: options.dry_run,
            ..Default::default()
        };

        for rejected in &staged.rejected {
            outcome.skipped.push(format!(
                "{} failed validation ({} errors)",
                rejected.path.display(),
                rejected.result.errors.len()
            ));
        }

        let mut candidates: Vec<&Candidate> = Vec::new();
        for candidate in &staged.candidates {
            if options.kind_filter.map_or(false, |k| candidate.kind != k) {
                continue;
            }
            if options.strict && !candidate.result.warnings.is_empty() {
                outcome.skipped.push(format!(
                    "{} has warnings and strict mode is on",
                    candidate.path.display()
                ));
                continue;
            }
            candidates.push(candidate);
        }

        if candidates.is_empty() {
            if options.force && !staged.rejected.is_empty() {
                bail!("nothing to install: every candidate failed validation");
            }
            bail!("no valid candidates found in {}", staged.origin);
        }

        let selected: Vec<&Candidate> = if options.interactive && candidates.len() > 1 {
            let labels: Vec<String> = candidates
                .iter()
                .map(|c| format!("{} {} ({})", c.kind, c.name, c.path.display()))
                .collect();
            let picks = selector.select("Select extensions to install", &labels)?;
            picks.into_iter().filter_map(|i| candidates.get(i).copied()).collect()
        } else {
            candidates
        };

        if selected.is_empty() {
            bail!("no candidates selected");
        }

        // Plan destinations up front so containment failures surface before
        // any file moves.
        let mut plan: Vec<(&Candidate, PathBuf)> = Vec::new();
        for candidate in &selected {
            let dest = self.destination_for(candidate, staged, options)?;
            plan.push((candidate, dest));
        }

        if options.dry_run {
            for (candidate, dest) in &plan {
                outcome
                    .installed
                    .push(self.build_record(candidate, dest, options, &staged.origin)?);
            }
            return Ok(outcome);
        }

        // File-system phase
        let mut log = RewindLog::new();
        let mut records = Vec::new();
        let fs_result = (|| -> Result<()> {
            for (candidate, dest) in &plan {
                self.copy_candidate(candidate, dest, options, &mut log)?;
                records.push(self.build_record(candidate, dest, options, &staged.origin)?);
            }
            Ok(())
        })();

        if let Err(err) = fs_result {
            let _ = log.replay();
            return Err(err).context("install aborted; file-system changes were rewound");
        }

        // Config phase: a single locked mutation appends every record
        let config_result = self.store.mutate(|doc| {
            for record in &records {
                if doc.find(record.kind, &record.name).is_some() {
                    if options.force {
                        doc.records_mut(record.kind).retain(|r| r.name != record.name);
                    } else {
                        bail!(
                            "a {} named {:?} is already installed in this scope",
                            record.kind,
                            record.name
                        );
                    }
                }
                doc.records_mut(record.kind).push(record.clone());
            }
            Ok(())
        });

        if let Err(err) = config_result {
            let _ = log.replay();
            let _ = self.store.restore_backup();
            return Err(err).context("install aborted; settings and files were restored");
        }

        outcome.installed = records;
        Ok(outcome)
    }

    /// Compute and vet the destination for one candidate (I4: the result
    /// must stay inside the scope root)
    fn destination_for(
        &self,
        candidate: &Candidate,
        staged: &StagedSource,
        options: &InstallOptions,
    ) -> Result<PathBuf> {
        let kind_dir = self.paths.kind_dir(candidate.kind);
        let mut dest_dir = kind_dir.clone();

        if let Some(target) = options.target_dir.as_deref() {
            let target_path = Path::new(target);
            if target.is_empty() {
                bail!("targetDir must not be empty");
            }
            if target_path.is_absolute() {
                bail!("targetDir must be relative, got {target}");
            }
            if has_parent_segments(target_path) {
                bail!("targetDir must not contain '..' segments, got {target}");
            }
            dest_dir = dest_dir.join(target_path);
        }

        let file_name = candidate
            .path
            .file_name()
            .context("candidate has no file name")?;
        let dest = if options.preserve_structure {
            match candidate.path.strip_prefix(&staged.root) {
                Ok(relative) => dest_dir.join(relative),
                Err(_) => dest_dir.join(file_name),
            }
        } else {
            dest_dir.join(file_name)
        };

        if !is_contained(&dest, &self.paths.root) {
            bail!(
                "destination {} escapes the scope root {}",
                dest.display(),
                self.paths.root.display()
            );
        }
        Ok(dest)
    }

    fn copy_candidate(
        &self,
        candidate: &Candidate,
        dest: &Path,
        options: &InstallOptions,
        log: &mut RewindLog,
    ) -> Result<()> {
        let parent = dest.parent().context("destination has no parent")?;

        // Track which ancestors we are about to create so rewind can prune them
        let mut existing = parent.to_path_buf();
        while !existing.exists() {
            if !existing.pop() {
                break;
            }
        }
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        if parent != existing {
            log.record_created_dirs(parent, &existing);
        }

        if dest.exists() {
            if !options.force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    dest.display()
                );
            }
            log.record_replaced(dest)?;
        } else {
            log.record_created(dest);
        }

        fs::copy(&candidate.path, dest).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                candidate.path.display(),
                dest.display()
            )
        })?;
        Ok(())
    }

    fn build_record(
        &self,
        candidate: &Candidate,
        dest: &Path,
        options: &InstallOptions,
        origin: &str,
    ) -> Result<ExtensionRecord> {
        let relative = dest
            .strip_prefix(&self.paths.root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| dest.to_string_lossy().to_string());

        let version = options
            .version_override
            .clone()
            .unwrap_or_else(|| candidate.version.clone());

        let mut record = ExtensionRecord::new(
            &candidate.name,
            candidate.kind,
            origin,
            &relative,
            &version,
        );
        record.validation_status = candidate.result.status();
        record.dependencies = options.dependencies.clone();

        let meta = &candidate.result.metadata;
        record.events = string_list(meta.get("events"));
        record.matchers = string_list(meta.get("matchers"));
        record.command = meta.get("command").and_then(Value::as_str).map(str::to_string);
        record.args = string_list(meta.get("args"));
        record.model = meta.get("model").and_then(Value::as_str).map(str::to_string);
        record.tools = string_list(meta.get("tools"));
        record.aliases = string_list(meta.get("aliases"));
        Ok(record)
    }

    /// Remove one installed extension
    pub fn remove(&self, name: &str, options: &RemoveOptions) -> Result<RemoveOutcome> {
        let doc = self.store.load()?;
        let record = self.locate(&doc, name, options.kind)?.clone();
        let file = self.paths.root.join(&record.path);

        // Anything that depends on this record blocks removal unless forced
        let dependents: Vec<String> = ExtensionKind::ALL
            .iter()
            .flat_map(|k| doc.records(*k).iter())
            .filter(|r| r.dependencies.iter().any(|d| d == name))
            .map(|r| format!("{} {}", r.kind, r.name))
            .collect();
        if !dependents.is_empty() && !options.force {
            bail!(
                "{name:?} is required by {}; pass --force to remove anyway",
                dependents.join(", ")
            );
        }

        if options.dry_run {
            return Ok(RemoveOutcome {
                record,
                removed_file: file,
                dry_run: true,
            });
        }

        // Keep a copy for the duration of the operation so a failed delete
        // can be rewound.
        let snapshot = if file.exists() {
            Some(fs::read(&file)?)
        } else {
            None
        };

        self.store.remove_extension(record.kind, name)?;

        let delete_result = (|| -> Result<()> {
            if file.exists() {
                fs::remove_file(&file)
                    .with_context(|| format!("Failed to delete {}", file.display()))?;
                if let Some(parent) = file.parent() {
                    // Prune the enclosing directory only when it emptied out
                    let _ = fs::remove_dir(parent);
                }
            }
            Ok(())
        })();

        if let Err(err) = delete_result {
            let _ = self.store.restore_backup();
            if let Some(bytes) = snapshot {
                let _ = fs::write(&file, bytes);
            }
            return Err(err).context("remove aborted; settings were restored");
        }

        Ok(RemoveOutcome {
            record,
            removed_file: file,
            dry_run: false,
        })
    }

    /// Find the record to remove, refusing ambiguous names (P7)
    fn locate<'d>(
        &self,
        doc: &'d SettingsDoc,
        name: &str,
        kind: Option<ExtensionKind>,
    ) -> Result<&'d ExtensionRecord> {
        if let Some(kind) = kind {
            return doc
                .find(kind, name)
                .with_context(|| format!("no {kind} named {name:?} in the {} scope", self.paths.scope));
        }

        let matches = doc.find_any_kind(name);
        match matches.len() {
            0 => bail!("nothing named {name:?} in the {} scope", self.paths.scope),
            1 => Ok(matches[0]),
            _ => {
                let kinds: Vec<String> = matches.iter().map(|r| r.kind.to_string()).collect();
                bail!(
                    "{name:?} is ambiguous across kinds ({}); pass --type to choose",
                    kinds.join(", ")
                )
            }
        }
    }

    /// Re-validate each record's file on disk and persist the outcome.
    ///
    /// A record whose file has gone missing is flagged as an error (I5);
    /// everything else gets a fresh run of its kind validator.
    pub async fn refresh_statuses(&self) -> Result<SettingsDoc> {
        let registry = crate::validators::ValidatorRegistry::new();
        let doc = self.store.load()?;

        // Validate outside the lock, commit the statuses inside it
        let mut statuses: Vec<(ExtensionKind, String, ValidationStatus)> = Vec::new();
        for kind in ExtensionKind::ALL {
            for record in doc.records(kind) {
                let file = self.paths.root.join(&record.path);
                let status = if !file.exists() {
                    ValidationStatus::Error
                } else {
                    registry.get(kind).validate_file(&file).await?.status()
                };
                statuses.push((kind, record.name.clone(), status));
            }
        }

        self.store.mutate(|doc| {
            for (kind, name, status) in &statuses {
                if let Some(record) = doc
                    .records_mut(*kind)
                    .iter_mut()
                    .find(|r| &r.name == name)
                {
                    record.validation_status = *status;
                }
            }
            Ok(())
        })
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LockConfig, PaccConfig};
    use crate::sources::SourceResolver;
    use tempfile::TempDir;

    const HOOK: &str = r#"{"name": "h", "version": "1.0.0", "description": "d",
        "eventTypes": ["PreToolUse"], "commands": ["echo 1"]}"#;

    fn installer_in(project: &TempDir) -> Installer {
        let paths = ScopePaths::project(project.path());
        let store = SettingsStore::new(paths.settings_path(), LockConfig::default());
        Installer::new(paths, store)
    }

    async fn stage_file(dir: &Path, name: &str, content: &str) -> StagedSource {
        let file = dir.join(name);
        fs::write(&file, content).unwrap();
        SourceResolver::new(PaccConfig::default())
            .resolve(file.to_str().unwrap(), None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_install_hook_file() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        let outcome = installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap();
        assert_eq!(outcome.installed.len(), 1);
        let record = &outcome.installed[0];
        assert_eq!(record.name, "h");
        assert_eq!(record.path, "hooks/h.json");
        assert_eq!(record.validation_status, ValidationStatus::Valid);
        assert!(project.path().join(".claude/hooks/h.json").exists());

        let doc = installer.store().load().unwrap();
        assert_eq!(doc.hooks.len(), 1);
        assert_eq!(doc.hooks[0].events.as_deref(), Some(&["PreToolUse".to_string()][..]));
    }

    #[tokio::test]
    async fn test_install_conflict_without_force() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap();
        let err = installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap_err();
        assert!(err.to_string().contains("rewound"), "{err}");

        // The first install's file is untouched
        assert!(project.path().join(".claude/hooks/h.json").exists());
        assert_eq!(installer.store().load().unwrap().hooks.len(), 1);
    }

    #[tokio::test]
    async fn test_install_force_overwrites() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap();
        let outcome = installer
            .install(
                &staged,
                &InstallOptions {
                    force: true,
                    ..Default::default()
                },
                &SelectAll,
            )
            .unwrap();
        assert_eq!(outcome.installed.len(), 1);
        assert_eq!(installer.store().load().unwrap().hooks.len(), 1);
    }

    #[tokio::test]
    async fn test_config_failure_rewinds_files() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        // Seed a conflicting record whose file lives elsewhere, so the
        // file-system phase succeeds but the config phase refuses.
        installer
            .store()
            .add_extension(ExtensionRecord::new(
                "h",
                ExtensionKind::Hook,
                "elsewhere",
                "hooks/other.json",
                "0.9.0",
            ))
            .unwrap();

        let err = installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap_err();
        assert!(err.to_string().contains("restored"), "{err}");

        // The copied file was rewound and settings kept the old record only
        assert!(!project.path().join(".claude/hooks/h.json").exists());
        let doc = installer.store().load().unwrap();
        assert_eq!(doc.hooks.len(), 1);
        assert_eq!(doc.hooks[0].version, "0.9.0");
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        let outcome = installer
            .install(
                &staged,
                &InstallOptions {
                    dry_run: true,
                    ..Default::default()
                },
                &SelectAll,
            )
            .unwrap();
        assert!(outcome.dry_run);
        assert_eq!(outcome.installed.len(), 1);
        assert!(!project.path().join(".claude").exists());
    }

    #[tokio::test]
    async fn test_target_dir_traversal_rejected() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        for bad in ["../escape", "/abs", ""] {
            let err = installer
                .install(
                    &staged,
                    &InstallOptions {
                        target_dir: Some(bad.to_string()),
                        ..Default::default()
                    },
                    &SelectAll,
                )
                .unwrap_err();
            assert!(err.to_string().contains("targetDir"), "{bad}: {err}");
        }
        assert!(!project.path().join(".claude").exists());
    }

    /// Selector stub that picks a fixed set of indices
    struct PickFirst;

    impl Selector for PickFirst {
        fn select(&self, _prompt: &str, _items: &[String]) -> Result<Vec<usize>> {
            Ok(vec![0])
        }

        fn confirm(&self, _prompt: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn hook_json(name: &str) -> String {
        format!(
            r#"{{"name": "{name}", "version": "1.0.0", "description": "d",
                "eventTypes": ["Stop"], "commands": ["echo {name}"]}}"#
        )
    }

    #[tokio::test]
    async fn test_partial_batch_failure_rewinds_everything() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        let hooks = source_dir.path().join("hooks");
        fs::create_dir_all(&hooks).unwrap();
        fs::write(hooks.join("a.json"), hook_json("a")).unwrap();
        fs::write(hooks.join("b.json"), hook_json("b")).unwrap();

        let staged = SourceResolver::new(PaccConfig::default())
            .resolve(source_dir.path().to_str().unwrap(), None, None)
            .await
            .unwrap();

        let installer = installer_in(&project);
        // Occupy b's destination so the batch fails mid-way through the
        // file-system phase.
        let dest_b = project.path().join(".claude/hooks/b.json");
        fs::create_dir_all(dest_b.parent().unwrap()).unwrap();
        fs::write(&dest_b, "occupied").unwrap();

        let err = installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap_err();
        assert!(err.to_string().contains("rewound"), "{err}");

        // a's copy was rolled back along with b's failure, and no records
        // were committed
        assert!(!project.path().join(".claude/hooks/a.json").exists());
        assert_eq!(fs::read_to_string(&dest_b).unwrap(), "occupied");
        assert!(installer.store().load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interactive_selection_subset() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        let hooks = source_dir.path().join("hooks");
        fs::create_dir_all(&hooks).unwrap();
        fs::write(hooks.join("a.json"), hook_json("a")).unwrap();
        fs::write(hooks.join("b.json"), hook_json("b")).unwrap();

        let staged = SourceResolver::new(PaccConfig::default())
            .resolve(source_dir.path().to_str().unwrap(), None, None)
            .await
            .unwrap();

        let installer = installer_in(&project);
        let outcome = installer
            .install(
                &staged,
                &InstallOptions {
                    interactive: true,
                    ..Default::default()
                },
                &PickFirst,
            )
            .unwrap();

        assert_eq!(outcome.installed.len(), 1);
        assert_eq!(installer.store().load().unwrap().hooks.len(), 1);
    }

    #[tokio::test]
    async fn test_target_dir_and_preserve_structure() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        // A nested source layout to replicate
        let nested = source_dir.path().join("hooks/ci");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("h.json"), HOOK).unwrap();

        let staged = SourceResolver::new(PaccConfig::default())
            .resolve(source_dir.path().to_str().unwrap(), None, None)
            .await
            .unwrap();

        let installer = installer_in(&project);
        let outcome = installer
            .install(
                &staged,
                &InstallOptions {
                    target_dir: Some("team".to_string()),
                    preserve_structure: true,
                    ..Default::default()
                },
                &SelectAll,
            )
            .unwrap();

        assert_eq!(outcome.installed.len(), 1);
        // hooks/<targetDir>/<source-relative layout>
        let expected = project.path().join(".claude/hooks/team/hooks/ci/h.json");
        assert!(expected.exists(), "missing {}", expected.display());
        assert_eq!(outcome.installed[0].path, "hooks/team/hooks/ci/h.json");
    }

    #[tokio::test]
    async fn test_fs_failure_leaves_settings_untouched() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        // Occupy the destination so the file-system phase fails before the
        // config phase runs.
        let dest = project.path().join(".claude/hooks/h.json");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "occupied").unwrap();

        let err = installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap_err();
        assert!(err.to_string().contains("rewound"), "{err}");

        // No settings file was ever written and the occupant survived
        assert!(installer.store().load().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "occupied");
    }

    #[tokio::test]
    async fn test_remove_round_trip() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        let before = installer.store().load().unwrap();
        installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap();
        installer.remove("h", &RemoveOptions::default()).unwrap();

        let after = installer.store().load().unwrap();
        assert_eq!(before, after);
        assert!(!project.path().join(".claude/hooks/h.json").exists());
        // The emptied hooks directory was pruned
        assert!(!project.path().join(".claude/hooks").exists());
    }

    #[tokio::test]
    async fn test_remove_ambiguous_name_refused() {
        let project = TempDir::new().unwrap();
        let installer = installer_in(&project);
        installer
            .store()
            .add_extension(ExtensionRecord::new("x", ExtensionKind::Hook, "s", "hooks/x.json", "1.0.0"))
            .unwrap();
        installer
            .store()
            .add_extension(ExtensionRecord::new("x", ExtensionKind::Agent, "s", "agents/x.md", "1.0.0"))
            .unwrap();
        let before = installer.store().load().unwrap();

        let err = installer.remove("x", &RemoveOptions::default()).unwrap_err();
        assert!(err.to_string().contains("ambiguous"), "{err}");
        assert_eq!(installer.store().load().unwrap(), before);

        // Disambiguated by kind it works
        installer
            .remove(
                "x",
                &RemoveOptions {
                    kind: Some(ExtensionKind::Hook),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_respects_dependents() {
        let project = TempDir::new().unwrap();
        let installer = installer_in(&project);
        installer
            .store()
            .add_extension(ExtensionRecord::new("base", ExtensionKind::Hook, "s", "hooks/base.json", "1.0.0"))
            .unwrap();
        let mut dependent =
            ExtensionRecord::new("top", ExtensionKind::Hook, "s", "hooks/top.json", "1.0.0");
        dependent.dependencies = vec!["base".to_string()];
        installer.store().add_extension(dependent).unwrap();

        let err = installer.remove("base", &RemoveOptions::default()).unwrap_err();
        assert!(err.to_string().contains("required by"), "{err}");

        installer
            .remove(
                "base",
                &RemoveOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(installer.store().load().unwrap().hooks.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_statuses_flags_orphan_records() {
        let project = TempDir::new().unwrap();
        let installer = installer_in(&project);
        installer
            .store()
            .add_extension(ExtensionRecord::new("ghost", ExtensionKind::Hook, "s", "hooks/ghost.json", "1.0.0"))
            .unwrap();

        let doc = installer.refresh_statuses().await.unwrap();
        assert_eq!(doc.hooks[0].validation_status, ValidationStatus::Error);
    }

    #[tokio::test]
    async fn test_refresh_statuses_revalidates_edited_files() {
        let project = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("hooks")).unwrap();
        let staged = stage_file(&source_dir.path().join("hooks"), "h.json", HOOK).await;

        let installer = installer_in(&project);
        installer
            .install(&staged, &InstallOptions::default(), &SelectAll)
            .unwrap();

        // Corrupt the installed file behind the store's back
        fs::write(project.path().join(".claude/hooks/h.json"), "{broken").unwrap();
        let doc = installer.refresh_statuses().await.unwrap();
        assert_eq!(doc.hooks[0].validation_status, ValidationStatus::Error);

        // Restore it and the status recovers
        fs::write(project.path().join(".claude/hooks/h.json"), HOOK).unwrap();
        let doc = installer.refresh_statuses().await.unwrap();
        assert_eq!(doc.hooks[0].validation_status, ValidationStatus::Valid);
    }
}
