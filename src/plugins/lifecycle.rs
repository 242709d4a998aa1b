use crate::config::PaccConfig;
use crate::git::{Git, GitError};
use crate::models::{PluginRepoRecord, PluginSettings, ScopePaths};
use crate::plugins::repo::{DiscoveredPlugin, PluginRepoManager, UpdateOutcome};
use crate::settings::JsonFileStore;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// One row of `plugin list`
#[derive(Debug, Clone, serde::Serialize)]
pub struct PluginInfo {
    pub repository: String,
    pub name: String,
    pub enabled: bool,
    pub commit: String,
}

/// Result of updating one repository
#[derive(Debug)]
pub enum UpdateStatus {
    UpToDate,
    Updated { old: String, new: String },
    UpdateAvailable,
    Failed(GitError),
}

/// Per-user plugin state and lifecycle operations.
///
/// Plugin state lives in its own settings file, apart from the extension
/// settings, so several plugins from one repository toggle independently.
/// All mutations go through the same atomic store protocol.
pub struct PluginService {
    paths: ScopePaths,
    store: JsonFileStore<PluginSettings>,
    repos: PluginRepoManager,
}

impl PluginService {
    pub fn new(paths: ScopePaths, config: &PaccConfig) -> Self {
        let store = JsonFileStore::new(paths.plugin_settings_path(), config.lock.clone());
        let repos = PluginRepoManager::new(Git::new(&config.git), paths.plugin_repos_dir());
        Self {
            paths,
            store,
            repos,
        }
    }

    pub fn store(&self) -> &JsonFileStore<PluginSettings> {
        &self.store
    }

    pub fn repos(&self) -> &PluginRepoManager {
        &self.repos
    }

    /// Clone a repository (if new) and optionally enable plugins from it
    pub async fn install(
        &self,
        url: &str,
        plugin: Option<&str>,
        enable_all: bool,
    ) -> Result<PluginRepoRecord> {
        let id = crate::git::parse_repo_url(url)
            .with_context(|| format!("cannot parse a repository from {url:?}"))?;

        let settings = self.store.load()?;
        let record = match settings.repo_record(&id.id()) {
            Some(existing) => existing,
            None => {
                let record = self.repos.clone(url).await?;
                self.store.mutate(|doc| doc.set_repo_record(&record))?;
                record
            }
        };

        if let Some(name) = plugin {
            if !record.plugins.iter().any(|p| p == name) {
                bail!(
                    "{} does not provide a plugin named {name:?}; available: {}",
                    record.id(),
                    record.plugins.join(", ")
                );
            }
            self.enable(&record.id(), name)?;
        } else if enable_all {
            for name in record.plugins.clone() {
                self.enable(&record.id(), &name)?;
            }
        }
        Ok(record)
    }

    /// Mark a plugin enabled; already-enabled is a no-op
    pub fn enable(&self, repo_id: &str, plugin: &str) -> Result<()> {
        let settings = self.store.load()?;
        let record = settings
            .repo_record(repo_id)
            .with_context(|| format!("repository {repo_id} is not installed"))?;
        if !record.plugins.iter().any(|p| p == plugin) {
            bail!("repository {repo_id} has no plugin named {plugin:?}");
        }

        self.store.mutate(|doc| {
            let mut enabled = doc.enabled_plugins(repo_id);
            if !enabled.iter().any(|p| p == plugin) {
                enabled.push(plugin.to_string());
                enabled.sort();
            }
            doc.set_enabled_plugins(repo_id, enabled);
            Ok(())
        })?;
        Ok(())
    }

    /// Mark a plugin disabled; already-disabled is a no-op
    pub fn disable(&self, repo_id: &str, plugin: &str) -> Result<()> {
        self.store.mutate(|doc| {
            let mut enabled = doc.enabled_plugins(repo_id);
            enabled.retain(|p| p != plugin);
            doc.set_enabled_plugins(repo_id, enabled);
            Ok(())
        })?;
        Ok(())
    }

    /// Enumerate repositories × plugins with their enabled state
    pub fn list(&self) -> Result<Vec<PluginInfo>> {
        let settings = self.store.load()?;
        let mut rows = Vec::new();
        for repo_id in settings.repositories.keys() {
            let Some(record) = settings.repo_record(repo_id) else {
                continue;
            };
            let enabled = settings.enabled_plugins(repo_id);
            for name in &record.plugins {
                rows.push(PluginInfo {
                    repository: repo_id.clone(),
                    name: name.clone(),
                    enabled: enabled.iter().any(|p| p == name),
                    commit: short_sha(&record.current_commit),
                });
            }
        }
        Ok(rows)
    }

    /// Discovered detail for one plugin by name (or `owner/repo:name`)
    pub async fn info(&self, name: &str) -> Result<(PluginRepoRecord, DiscoveredPlugin, bool)> {
        let (repo_filter, plugin_name) = match name.split_once(':') {
            Some((repo, plugin)) => (Some(repo.to_string()), plugin.to_string()),
            None => (None, name.to_string()),
        };

        let settings = self.store.load()?;
        for repo_id in settings.repositories.keys() {
            if repo_filter.as_deref().is_some_and(|f| f != repo_id.as_str()) {
                continue;
            }
            let Some(record) = settings.repo_record(repo_id) else {
                continue;
            };
            if !record.plugins.iter().any(|p| p == &plugin_name) {
                continue;
            }
            let repo_dir = self.paths.root.join(&record.path);
            let discovered = self.repos.discover(&repo_dir).await?;
            if let Some(plugin) = discovered.into_iter().find(|p| p.manifest.name == plugin_name) {
                let enabled = settings
                    .enabled_plugins(repo_id)
                    .iter()
                    .any(|p| p == &plugin_name);
                return Ok((record, plugin, enabled));
            }
        }
        bail!("no installed plugin named {name:?}");
    }

    /// Remove a plugin (by name) or a whole repository (by `owner/repo`)
    pub async fn remove(&self, name: &str) -> Result<Vec<String>> {
        let settings = self.store.load()?;

        // Whole repository
        if settings.repositories.contains_key(name) {
            let record = settings
                .repo_record(name)
                .with_context(|| format!("corrupt repository record for {name}"))?;
            self.repos.remove(&record)?;
            self.store.mutate(|doc| {
                doc.repositories.remove(name);
                doc.enabled.remove(name);
                Ok(())
            })?;
            return Ok(record.plugins);
        }

        // Single plugin: drop it from its repo's enabled set and record;
        // the last plugin takes the clone with it.
        for repo_id in settings.repositories.keys() {
            let Some(mut record) = settings.repo_record(repo_id) else {
                continue;
            };
            if !record.plugins.iter().any(|p| p == name) {
                continue;
            }
            record.plugins.retain(|p| p != name);
            let delete_repo = record.plugins.is_empty();
            if delete_repo {
                self.repos.remove(&record)?;
            }
            let repo_id = repo_id.clone();
            self.store.mutate(|doc| {
                let mut enabled = doc.enabled_plugins(&repo_id);
                enabled.retain(|p| p != name);
                doc.set_enabled_plugins(&repo_id, enabled);
                if delete_repo {
                    doc.repositories.remove(&repo_id);
                } else {
                    doc.set_repo_record(&record)?;
                }
                Ok(())
            })?;
            return Ok(vec![name.to_string()]);
        }

        bail!("no installed plugin or repository named {name:?}");
    }

    /// Update one repository (or all), pinning the new commit only on success
    pub async fn update(
        &self,
        target: Option<&str>,
        check_only: bool,
        force: bool,
    ) -> Result<Vec<(String, UpdateStatus)>> {
        let settings = self.store.load()?;
        let mut outcomes = Vec::new();

        for repo_id in settings.repositories.keys() {
            if let Some(target) = target {
                let wanted = crate::git::parse_repo_url(target)
                    .map(|id| id.id())
                    .unwrap_or_else(|| target.to_string());
                if &wanted != repo_id {
                    continue;
                }
            }
            let Some(record) = settings.repo_record(repo_id) else {
                continue;
            };

            if check_only {
                let status = match self.check_remote(&record).await {
                    Ok(true) => UpdateStatus::UpdateAvailable,
                    Ok(false) => UpdateStatus::UpToDate,
                    Err(err) => UpdateStatus::Failed(err),
                };
                outcomes.push((repo_id.clone(), status));
                continue;
            }

            let attempt = self.repos.update(&record).await;
            let attempt = match attempt {
                Err(GitError::NonFastForward) if force => self.repos.update_forced(&record).await,
                other => other,
            };

            let status = match attempt {
                Ok(UpdateOutcome {
                    had_changes: false, ..
                }) => UpdateStatus::UpToDate,
                Ok(outcome) => {
                    self.pin_commit(repo_id, &outcome.new_commit)?;
                    UpdateStatus::Updated {
                        old: outcome.old_commit,
                        new: outcome.new_commit,
                    }
                }
                Err(err) => UpdateStatus::Failed(err),
            };
            outcomes.push((repo_id.clone(), status));
        }

        if outcomes.is_empty() {
            bail!("no matching plugin repositories installed");
        }
        Ok(outcomes)
    }

    /// Roll a repository back to a commit and re-pin it
    pub async fn rollback(&self, repo_id: &str, sha: &str) -> Result<String> {
        let settings = self.store.load()?;
        let record = settings
            .repo_record(repo_id)
            .with_context(|| format!("repository {repo_id} is not installed"))?;
        let landed = self.repos.rollback(&record, sha).await?;
        self.pin_commit(repo_id, &landed)?;
        Ok(landed)
    }

    /// Align clones with their pinned commits (team sync). `check` reports
    /// drift without touching trees; a dirty tree is only reset with `force`.
    pub async fn sync_repos(
        &self,
        target: Option<&str>,
        check: bool,
        force: bool,
    ) -> Result<Vec<(String, UpdateStatus)>> {
        let settings = self.store.load()?;
        let mut outcomes = Vec::new();

        for repo_id in settings.repositories.keys() {
            if let Some(target) = target {
                let wanted = crate::git::parse_repo_url(target)
                    .map(|id| id.id())
                    .unwrap_or_else(|| target.to_string());
                if &wanted != repo_id {
                    continue;
                }
            }
            let Some(record) = settings.repo_record(repo_id) else {
                continue;
            };
            let head = match self.repos.head(&record).await {
                Ok(head) => head,
                Err(err) => {
                    outcomes.push((repo_id.clone(), UpdateStatus::Failed(err)));
                    continue;
                }
            };
            if head == record.current_commit {
                outcomes.push((repo_id.clone(), UpdateStatus::UpToDate));
                continue;
            }
            if check {
                outcomes.push((repo_id.clone(), UpdateStatus::UpdateAvailable));
                continue;
            }

            if !force {
                let id = crate::git::RepoId {
                    owner: record.owner.clone(),
                    repo: record.repo.clone(),
                };
                match Git::new(&crate::config::GitConfig::default())
                    .is_dirty(&self.repos.repo_dir(&id))
                    .await
                {
                    Ok(true) => {
                        outcomes.push((repo_id.clone(), UpdateStatus::Failed(GitError::DirtyWorkTree)));
                        continue;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        outcomes.push((repo_id.clone(), UpdateStatus::Failed(err)));
                        continue;
                    }
                }
            }

            let status = match self.repos.rollback(&record, &record.current_commit).await {
                Ok(new) => UpdateStatus::Updated { old: head, new },
                Err(err) => UpdateStatus::Failed(err),
            };
            outcomes.push((repo_id.clone(), status));
        }
        Ok(outcomes)
    }

    async fn check_remote(&self, record: &PluginRepoRecord) -> Result<bool, GitError> {
        let id = crate::git::RepoId {
            owner: record.owner.clone(),
            repo: record.repo.clone(),
        };
        let dir = self.repos.repo_dir(&id);
        let git = Git::new(&crate::config::GitConfig::default());
        git.fetch(&dir).await?;
        let remote = git.fetch_head(&dir).await?;
        Ok(remote != record.current_commit)
    }

    fn pin_commit(&self, repo_id: &str, commit: &str) -> Result<()> {
        let repo_id = repo_id.to_string();
        let commit = commit.to_string();
        self.store.mutate(|doc| {
            if let Some(mut record) = doc.repo_record(&repo_id) {
                record.current_commit = commit.clone();
                record.last_updated = chrono::Utc::now().to_rfc3339();
                doc.set_repo_record(&record)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn repos_root(&self) -> PathBuf {
        self.paths.plugin_repos_dir()
    }
}

/// Parse an `owner/repo:plugin` identifier
pub fn parse_plugin_id(id: &str) -> Result<(String, String)> {
    let (repo, plugin) = id
        .split_once(':')
        .with_context(|| format!("expected owner/repo:plugin, got {id:?}"))?;
    if crate::git::parse_repo_url(repo).is_none() {
        bail!("expected owner/repo before ':', got {repo:?}");
    }
    if plugin.trim().is_empty() {
        bail!("plugin name after ':' must not be empty");
    }
    Ok((repo.to_string(), plugin.to_string()))
}

fn short_sha(sha: &str) -> String {
    sha.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PluginRepoRecord;
    use tempfile::TempDir;

    fn service(home: &TempDir) -> PluginService {
        PluginService::new(ScopePaths::user(home.path()), &PaccConfig::default())
    }

    fn seeded_record() -> PluginRepoRecord {
        PluginRepoRecord {
            owner: "acme".into(),
            repo: "tools".into(),
            path: "plugins/repos/acme/tools".into(),
            url: "https://github.com/acme/tools.git".into(),
            current_commit: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
            last_updated: "2025-01-01T00:00:00Z".into(),
            plugins: vec!["linter".into(), "formatter".into()],
        }
    }

    fn seed(service: &PluginService) {
        let record = seeded_record();
        service.store().mutate(|doc| doc.set_repo_record(&record)).unwrap();
    }

    #[test]
    fn test_parse_plugin_id() {
        let (repo, plugin) = parse_plugin_id("acme/tools:linter").unwrap();
        assert_eq!(repo, "acme/tools");
        assert_eq!(plugin, "linter");
        assert!(parse_plugin_id("acme/tools").is_err());
        assert!(parse_plugin_id("not a repo:linter").is_err());
        assert!(parse_plugin_id("acme/tools:").is_err());
    }

    #[test]
    fn test_enable_disable_idempotent() {
        let home = TempDir::new().unwrap();
        let service = service(&home);
        seed(&service);

        service.enable("acme/tools", "linter").unwrap();
        service.enable("acme/tools", "linter").unwrap();
        let settings = service.store().load().unwrap();
        assert_eq!(settings.enabled_plugins("acme/tools"), vec!["linter"]);

        service.disable("acme/tools", "linter").unwrap();
        service.disable("acme/tools", "linter").unwrap();
        assert!(service
            .store()
            .load()
            .unwrap()
            .enabled_plugins("acme/tools")
            .is_empty());
    }

    #[test]
    fn test_enable_unknown_plugin_fails() {
        let home = TempDir::new().unwrap();
        let service = service(&home);
        seed(&service);

        assert!(service.enable("acme/tools", "ghost").is_err());
        assert!(service.enable("nobody/nothing", "linter").is_err());
    }

    #[test]
    fn test_list_annotates_enabled_state() {
        let home = TempDir::new().unwrap();
        let service = service(&home);
        seed(&service);
        service.enable("acme/tools", "formatter").unwrap();

        let rows = service.list().unwrap();
        assert_eq!(rows.len(), 2);
        let formatter = rows.iter().find(|r| r.name == "formatter").unwrap();
        assert!(formatter.enabled);
        let linter = rows.iter().find(|r| r.name == "linter").unwrap();
        assert!(!linter.enabled);
        assert_eq!(formatter.commit, "aaaaaaaa");
    }

    #[tokio::test]
    async fn test_remove_single_plugin_keeps_repo() {
        let home = TempDir::new().unwrap();
        let service = service(&home);
        seed(&service);
        service.enable("acme/tools", "linter").unwrap();

        let removed = service.remove("linter").await.unwrap();
        assert_eq!(removed, vec!["linter"]);

        let settings = service.store().load().unwrap();
        let record = settings.repo_record("acme/tools").unwrap();
        assert_eq!(record.plugins, vec!["formatter"]);
        assert!(settings.enabled_plugins("acme/tools").is_empty());
    }

    #[tokio::test]
    async fn test_remove_whole_repository() {
        let home = TempDir::new().unwrap();
        let service = service(&home);
        seed(&service);

        let removed = service.remove("acme/tools").await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(service.store().load().unwrap().repositories.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_fails() {
        let home = TempDir::new().unwrap();
        let service = service(&home);
        seed(&service);
        assert!(service.remove("ghost").await.is_err());
    }

    // --- live-git update flow ---

    async fn run_git(dir: &std::path::Path, args: &[&str]) {
        let status = tokio::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .unwrap();
        assert!(status.success(), "git {args:?} failed in {}", dir.display());
    }

    async fn git_available() -> bool {
        tokio::process::Command::new("git")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn head_of(dir: &std::path::Path) -> String {
        let out = tokio::process::Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    async fn commit_file(dir: &std::path::Path, name: &str, content: &str, message: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        run_git(dir, &["add", "."]).await;
        run_git(dir, &["commit", "-q", "-m", message]).await;
    }

    /// Build a remote repo, clone it into the service's layout, and seed the
    /// settings record pinned at the clone's HEAD.
    async fn seeded_live_repo(home: &TempDir, remote: &TempDir) -> (PluginService, String) {
        run_git(remote.path(), &["init", "-q"]).await;
        run_git(remote.path(), &["config", "user.email", "t@example.com"]).await;
        run_git(remote.path(), &["config", "user.name", "t"]).await;
        commit_file(remote.path(), "plugin.json", r#"{"name": "live", "version": "1.0.0"}"#, "init").await;

        let service = service(home);
        let clone_dir = service.repos_root().join("acme/tools");
        std::fs::create_dir_all(clone_dir.parent().unwrap()).unwrap();
        run_git(
            clone_dir.parent().unwrap(),
            &["clone", "-q", remote.path().to_str().unwrap(), "tools"],
        )
        .await;

        let head = head_of(&clone_dir).await;
        let record = PluginRepoRecord {
            owner: "acme".into(),
            repo: "tools".into(),
            path: "plugins/repos/acme/tools".into(),
            url: remote.path().to_string_lossy().to_string(),
            current_commit: head.clone(),
            last_updated: "2025-01-01T00:00:00Z".into(),
            plugins: vec!["live".into()],
        };
        service.store().mutate(|doc| doc.set_repo_record(&record)).unwrap();
        (service, head)
    }

    fn pinned(service: &PluginService) -> String {
        service
            .store()
            .load()
            .unwrap()
            .repo_record("acme/tools")
            .unwrap()
            .current_commit
    }

    #[tokio::test]
    async fn test_update_fast_forward_pins_new_commit() {
        if !git_available().await {
            return;
        }
        let home = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let (service, old_head) = seeded_live_repo(&home, &remote).await;

        // Remote advances by one commit; the update fast-forwards
        commit_file(remote.path(), "plugin.json", r#"{"name": "live", "version": "1.1.0"}"#, "bump").await;
        let outcomes = service.update(Some("acme/tools"), false, false).await.unwrap();
        assert!(matches!(outcomes[0].1, UpdateStatus::Updated { .. }));

        let new_pin = pinned(&service);
        assert_ne!(new_pin, old_head);
        let clone_head = head_of(&service.repos_root().join("acme/tools")).await;
        assert_eq!(new_pin, clone_head);
    }

    #[tokio::test]
    async fn test_update_non_fast_forward_leaves_pin() {
        if !git_available().await {
            return;
        }
        let home = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let (service, old_head) = seeded_live_repo(&home, &remote).await;

        // Rewrite remote history so the local branch diverges
        run_git(remote.path(), &["commit", "-q", "--amend", "-m", "rewritten"]).await;
        let outcomes = service.update(Some("acme/tools"), false, false).await.unwrap();
        assert!(matches!(
            outcomes[0].1,
            UpdateStatus::Failed(GitError::NonFastForward)
        ));

        // Neither the pin nor the working tree moved
        assert_eq!(pinned(&service), old_head);
        let clone_head = head_of(&service.repos_root().join("acme/tools")).await;
        assert_eq!(clone_head, old_head);
    }

    #[tokio::test]
    async fn test_update_forced_resets_to_remote_tip() {
        if !git_available().await {
            return;
        }
        let home = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let (service, old_head) = seeded_live_repo(&home, &remote).await;

        run_git(remote.path(), &["commit", "-q", "--amend", "-m", "rewritten"]).await;
        let remote_head = head_of(remote.path()).await;

        let outcomes = service.update(Some("acme/tools"), false, true).await.unwrap();
        assert!(matches!(outcomes[0].1, UpdateStatus::Updated { .. }));
        assert_eq!(pinned(&service), remote_head);
        assert_ne!(pinned(&service), old_head);
    }

    #[tokio::test]
    async fn test_update_refuses_dirty_tree() {
        if !git_available().await {
            return;
        }
        let home = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let (service, old_head) = seeded_live_repo(&home, &remote).await;

        std::fs::write(
            service.repos_root().join("acme/tools/scratch.txt"),
            "local edits",
        )
        .unwrap();
        let outcomes = service.update(Some("acme/tools"), false, false).await.unwrap();
        assert!(matches!(
            outcomes[0].1,
            UpdateStatus::Failed(GitError::DirtyWorkTree)
        ));
        assert_eq!(pinned(&service), old_head);
    }

    #[tokio::test]
    async fn test_rollback_to_earlier_commit() {
        if !git_available().await {
            return;
        }
        let home = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let (service, first_head) = seeded_live_repo(&home, &remote).await;

        commit_file(remote.path(), "extra.txt", "more", "second").await;
        service.update(Some("acme/tools"), false, false).await.unwrap();
        assert_ne!(pinned(&service), first_head);

        let landed = service.rollback("acme/tools", &first_head).await.unwrap();
        assert_eq!(landed, first_head);
        assert_eq!(pinned(&service), first_head);

        let bogus = service
            .rollback("acme/tools", "0000000000000000000000000000000000000000")
            .await;
        assert!(bogus.is_err());
    }
}
