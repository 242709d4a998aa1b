use crate::config::LockConfig;
use crate::models::{ScopePaths, ValidationResult};
use crate::settings::JsonFileStore;
use crate::validators::FragmentValidator;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Directory under a scope root where fragment files live
const FRAGMENTS_DIR: &str = "fragments";

/// Settings file tracking installed fragments, sibling to the extension
/// settings but owned by this subsystem
const FRAGMENT_SETTINGS_FILE: &str = "fragments.json";

/// One installed context fragment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FragmentRecord {
    pub name: String,
    /// Install location relative to the scope root
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub installed_at: String,
}

/// The fragment settings document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FragmentSettings {
    #[serde(default)]
    pub fragments: Vec<FragmentRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fragment storage for one scope.
///
/// Fragments ride the same rails as extensions: validation before anything
/// moves, file copy before the settings mutation, and a locked atomic store
/// underneath. They never touch the extension settings document.
pub struct FragmentStore {
    paths: ScopePaths,
    store: JsonFileStore<FragmentSettings>,
    validator: FragmentValidator,
}

impl FragmentStore {
    pub fn new(paths: ScopePaths, lock: LockConfig) -> Self {
        let store = JsonFileStore::new(paths.root.join(FRAGMENT_SETTINGS_FILE), lock);
        Self {
            paths,
            store,
            validator: FragmentValidator::new(),
        }
    }

    pub fn store(&self) -> &JsonFileStore<FragmentSettings> {
        &self.store
    }

    fn fragment_dir(&self) -> PathBuf {
        self.paths.root.join(FRAGMENTS_DIR)
    }

    /// Validate and install one fragment file; an existing fragment of the
    /// same name is only replaced with `force`.
    pub async fn install(&self, file: &Path, force: bool) -> Result<(FragmentRecord, ValidationResult)> {
        let result = self.validator.validate_file(file).await?;
        if !result.valid {
            let first = result
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            bail!("fragment {} is invalid: {first}", file.display());
        }

        let name = result
            .meta_str("title")
            .map(slugify)
            .or_else(|| crate::utils::file_stem(file))
            .context("fragment has no usable name")?;

        let dest = self.fragment_dir().join(format!("{name}.md"));
        let existed = dest.exists();
        if existed && !force {
            bail!("fragment {name:?} is already installed");
        }
        let previous = if existed { Some(std::fs::read(&dest)?) } else { None };

        std::fs::create_dir_all(self.fragment_dir())?;
        std::fs::copy(file, &dest)
            .with_context(|| format!("Failed to copy {} to {}", file.display(), dest.display()))?;

        let record = FragmentRecord {
            name: name.clone(),
            path: format!("{FRAGMENTS_DIR}/{name}.md"),
            title: result.meta_str("title").map(str::to_string),
            description: result.meta_str("description").map(str::to_string),
            tags: result
                .metadata
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            installed_at: chrono::Utc::now().to_rfc3339(),
        };

        let commit = self.store.mutate(|doc| {
            doc.fragments.retain(|f| f.name != name);
            doc.fragments.push(record.clone());
            Ok(())
        });

        if let Err(err) = commit {
            // Rewind the copy so the store and the tree stay in step
            match previous {
                Some(bytes) => {
                    let _ = std::fs::write(&dest, bytes);
                }
                None => {
                    let _ = std::fs::remove_file(&dest);
                    let _ = std::fs::remove_dir(self.fragment_dir());
                }
            }
            return Err(err).context("fragment install aborted; file was rewound");
        }

        Ok((record, result))
    }

    /// Installed fragments, in install order
    pub fn list(&self) -> Result<Vec<FragmentRecord>> {
        Ok(self.store.load()?.fragments)
    }

    /// One fragment's record and body
    pub fn get(&self, name: &str) -> Result<(FragmentRecord, String)> {
        let doc = self.store.load()?;
        let record = doc
            .fragments
            .iter()
            .find(|f| f.name == name)
            .with_context(|| format!("no fragment named {name:?}"))?
            .clone();
        let content = crate::utils::read_text(&self.paths.root.join(&record.path))?;
        Ok((record, content))
    }

    /// Remove a fragment's record, then its file; a failed delete restores
    /// the settings backup.
    pub fn remove(&self, name: &str) -> Result<FragmentRecord> {
        let doc = self.store.load()?;
        let record = doc
            .fragments
            .iter()
            .find(|f| f.name == name)
            .with_context(|| format!("no fragment named {name:?}"))?
            .clone();

        self.store.mutate(|doc| {
            doc.fragments.retain(|f| f.name != name);
            Ok(())
        })?;

        let file = self.paths.root.join(&record.path);
        if file.exists() {
            if let Err(err) = std::fs::remove_file(&file) {
                let _ = self.store.restore_backup();
                return Err(err)
                    .with_context(|| format!("Failed to delete {}; settings were restored", file.display()));
            }
            let _ = std::fs::remove_dir(self.fragment_dir());
        }
        Ok(record)
    }
}

/// Lowercased name with path-hostile characters replaced
fn slugify(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
