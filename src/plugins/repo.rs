use crate::git::{authenticated_url, clone_url, parse_repo_url, Git, GitError, RepoId};
use crate::models::{ExtensionKind, PluginManifest, PluginRepoRecord};
use crate::utils::walk_files;
use crate::validators::PluginValidator;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One plugin found inside a cloned repository
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    /// Plugin directory relative to the repository root
    pub path: PathBuf,
    /// Component file counts per kind
    pub components: BTreeMap<ExtensionKind, usize>,
}

/// Outcome of an update attempt
#[derive(Debug)]
pub struct UpdateOutcome {
    pub had_changes: bool,
    pub old_commit: String,
    pub new_commit: String,
}

/// Clones and tracks Git repositories that publish plugin bundles.
///
/// Repositories live under `<scope_root>/plugins/repos/<owner>/<repo>`.
pub struct PluginRepoManager {
    git: Git,
    repos_root: PathBuf,
}

impl PluginRepoManager {
    pub fn new(git: Git, repos_root: PathBuf) -> Self {
        Self { git, repos_root }
    }

    pub fn repo_dir(&self, id: &RepoId) -> PathBuf {
        self.repos_root.join(&id.owner).join(&id.repo)
    }

    /// Clone a repository and validate its plugin structure
    pub async fn clone(&self, url: &str) -> Result<PluginRepoRecord> {
        let id = parse_repo_url(url)
            .with_context(|| format!("cannot parse a repository from {url:?}"))?;
        let dest = self.repo_dir(&id);
        if dest.exists() {
            bail!("repository {} is already installed", id.id());
        }
        std::fs::create_dir_all(dest.parent().context("repo dir has no parent")?)?;

        // Private remotes: a token for well-known hosts, or user/password
        // for everything else, both sourced from the environment.
        let token = std::env::var("PACC_GIT_TOKEN").ok();
        let user = std::env::var("PACC_GIT_USERNAME").ok();
        let password = std::env::var("PACC_GIT_PASSWORD").ok();
        let userpass = user.as_deref().zip(password.as_deref());
        let remote = authenticated_url(&clone_url(url), token.as_deref(), userpass);
        self.git.clone(&remote, &dest).await?;

        let commit = self.git.head_sha(&dest).await?;
        let plugins = self.discover(&dest).await?;
        if plugins.is_empty() {
            let _ = std::fs::remove_dir_all(&dest);
            bail!("{} contains no plugins (no plugin.json found)", id.id());
        }

        // Every discovered plugin must carry a valid manifest and components
        let validator = PluginValidator::new();
        for plugin in &plugins {
            let (result, _) = validator.validate_dir(&dest.join(&plugin.path)).await?;
            if !result.valid {
                let first = result
                    .errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_default();
                let _ = std::fs::remove_dir_all(&dest);
                bail!("plugin {:?} in {} is invalid: {first}", plugin.manifest.name, id.id());
            }
        }

        let relative = format!(
            "{}/{}/{}",
            crate::constants::PLUGIN_REPOS_DIR,
            id.owner,
            id.repo
        );

        Ok(PluginRepoRecord {
            owner: id.owner.clone(),
            repo: id.repo.clone(),
            path: relative,
            url: clone_url(url),
            current_commit: commit,
            last_updated: chrono::Utc::now().to_rfc3339(),
            plugins: plugins.iter().map(|p| p.manifest.name.clone()).collect(),
        })
    }

    /// Walk a cloned tree for directories holding a `plugin.json`
    pub async fn discover(&self, repo_dir: &Path) -> Result<Vec<DiscoveredPlugin>> {
        let mut found = Vec::new();
        let mut manifest_files: Vec<PathBuf> = walk_files(repo_dir, Some(&["json"]), false)
            .into_iter()
            .filter(|p| p.file_name().and_then(|n| n.to_str()) == Some("plugin.json"))
            .collect();
        manifest_files.sort();

        for manifest_path in manifest_files {
            let raw = crate::utils::read_text(&manifest_path)?;
            let manifest: PluginManifest = match serde_json::from_str(&raw) {
                Ok(manifest) => manifest,
                Err(err) => {
                    log::warn!("skipping malformed {}: {err}", manifest_path.display());
                    continue;
                }
            };

            let plugin_dir = manifest_path
                .parent()
                .context("plugin.json has no parent")?;
            let mut components = BTreeMap::new();
            for kind in ExtensionKind::ALL {
                let dir = plugin_dir.join(kind.dir_name());
                if dir.is_dir() {
                    let count = walk_files(&dir, None, false).len();
                    if count > 0 {
                        components.insert(kind, count);
                    }
                }
            }

            found.push(DiscoveredPlugin {
                manifest,
                path: plugin_dir
                    .strip_prefix(repo_dir)
                    .unwrap_or(Path::new(""))
                    .to_path_buf(),
                components,
            });
        }
        Ok(found)
    }

    /// Fetch and fast-forward; a tree that cannot fast-forward is left
    /// untouched and the typed error is surfaced.
    pub async fn update(&self, record: &PluginRepoRecord) -> Result<UpdateOutcome, GitError> {
        let id = RepoId {
            owner: record.owner.clone(),
            repo: record.repo.clone(),
        };
        let dir = self.repo_dir(&id);

        if self.git.is_dirty(&dir).await? {
            return Err(GitError::DirtyWorkTree);
        }

        let old_commit = self.git.head_sha(&dir).await?;
        self.git.fetch(&dir).await?;
        let remote_commit = self.git.fetch_head(&dir).await?;

        if remote_commit == old_commit {
            return Ok(UpdateOutcome {
                had_changes: false,
                old_commit: old_commit.clone(),
                new_commit: old_commit,
            });
        }

        self.git.fast_forward(&dir).await?;
        let new_commit = self.git.head_sha(&dir).await?;
        Ok(UpdateOutcome {
            had_changes: true,
            old_commit,
            new_commit,
        })
    }

    /// Force an update past a non-fast-forward by hard-resetting to the
    /// fetched remote tip. Destructive by design; only reached via --force.
    pub async fn update_forced(&self, record: &PluginRepoRecord) -> Result<UpdateOutcome, GitError> {
        let id = RepoId {
            owner: record.owner.clone(),
            repo: record.repo.clone(),
        };
        let dir = self.repo_dir(&id);
        let old_commit = self.git.head_sha(&dir).await?;
        self.git.fetch(&dir).await?;
        let remote_commit = self.git.fetch_head(&dir).await?;
        self.git.hard_reset(&dir, &remote_commit).await?;
        Ok(UpdateOutcome {
            had_changes: old_commit != remote_commit,
            old_commit,
            new_commit: remote_commit,
        })
    }

    /// Hard reset to a known commit; fails with `UnknownSha` otherwise
    pub async fn rollback(&self, record: &PluginRepoRecord, sha: &str) -> Result<String, GitError> {
        let id = RepoId {
            owner: record.owner.clone(),
            repo: record.repo.clone(),
        };
        let dir = self.repo_dir(&id);
        self.git.hard_reset(&dir, sha).await?;
        self.git.head_sha(&dir).await
    }

    /// Delete a repository clone
    pub fn remove(&self, record: &PluginRepoRecord) -> Result<()> {
        let id = RepoId {
            owner: record.owner.clone(),
            repo: record.repo.clone(),
        };
        let dir = self.repo_dir(&id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
        }
        // Prune the now-empty owner directory
        if let Some(owner_dir) = dir.parent() {
            let _ = std::fs::remove_dir(owner_dir);
        }
        Ok(())
    }

    /// HEAD of a tracked clone
    pub async fn head(&self, record: &PluginRepoRecord) -> Result<String, GitError> {
        let id = RepoId {
            owner: record.owner.clone(),
            repo: record.repo.clone(),
        };
        self.git.head_sha(&self.repo_dir(&id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitConfig;
    use std::fs;
    use tempfile::TempDir;

    fn manager(root: &Path) -> PluginRepoManager {
        PluginRepoManager::new(Git::new(&GitConfig::default()), root.to_path_buf())
    }

    fn write_plugin(dir: &Path, name: &str) {
        fs::create_dir_all(dir.join("hooks")).unwrap();
        fs::write(
            dir.join("plugin.json"),
            format!(r#"{{"name": "{name}", "version": "1.0.0"}}"#),
        )
        .unwrap();
        fs::write(
            dir.join("hooks/h.json"),
            r#"{"name": "h", "version": "1.0.0", "description": "d", "eventTypes": ["Stop"], "commands": ["true"]}"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_discover_finds_nested_plugins() {
        let repo = TempDir::new().unwrap();
        write_plugin(&repo.path().join("linter"), "linter");
        write_plugin(&repo.path().join("tools/formatter"), "formatter");
        fs::write(repo.path().join("README.md"), "# repo").unwrap();

        let found = manager(repo.path())
            .discover(repo.path())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        let names: Vec<_> = found.iter().map(|p| p.manifest.name.as_str()).collect();
        assert!(names.contains(&"linter"));
        assert!(names.contains(&"formatter"));
        let linter = found.iter().find(|p| p.manifest.name == "linter").unwrap();
        assert_eq!(linter.components[&ExtensionKind::Hook], 1);
    }

    #[tokio::test]
    async fn test_discover_skips_malformed_manifest() {
        let repo = TempDir::new().unwrap();
        write_plugin(&repo.path().join("good"), "good");
        fs::create_dir_all(repo.path().join("bad")).unwrap();
        fs::write(repo.path().join("bad/plugin.json"), "not json").unwrap();

        let found = manager(repo.path()).discover(repo.path()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].manifest.name, "good");
    }

    #[test]
    fn test_repo_dir_layout() {
        let root = TempDir::new().unwrap();
        let mgr = manager(root.path());
        let dir = mgr.repo_dir(&RepoId {
            owner: "acme".into(),
            repo: "tools".into(),
        });
        assert_eq!(dir, root.path().join("acme/tools"));
    }
}
