use crate::config::LockConfig;
use crate::models::{ExtensionKind, ExtensionRecord, SettingsDoc};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Lock acquisition failures, separated from ordinary IO errors so callers
/// can report "configuration busy" distinctly.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("configuration busy: could not acquire lock on {path} within {waited_ms} ms")]
    Timeout { path: PathBuf, waited_ms: u64 },
    #[error("failed to create lockfile {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Held advisory lock; the sidecar lockfile is removed on drop
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the sidecar lockfile with bounded exponential backoff.
///
/// The lockfile is created with create-new semantics, which is atomic on
/// every platform we target. A lockfile older than the configured stale age
/// is treated as abandoned and taken over.
fn acquire_lock(lock_path: &Path, cfg: &LockConfig) -> Result<LockGuard, LockError> {
    let started = SystemTime::now();
    let mut delay = Duration::from_millis(cfg.backoff_start_ms.max(1));
    let cap = Duration::from_millis(cfg.backoff_cap_ms.max(1));
    let timeout = Duration::from_millis(cfg.timeout_ms);

    loop {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                return Ok(LockGuard {
                    path: lock_path.to_path_buf(),
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if lock_is_stale(lock_path, cfg.stale_after_ms) {
                    let _ = fs::remove_file(lock_path);
                    continue;
                }
            }
            Err(source) => {
                return Err(LockError::Io {
                    path: lock_path.to_path_buf(),
                    source,
                })
            }
        }

        let waited = started.elapsed().unwrap_or_default();
        if waited >= timeout {
            return Err(LockError::Timeout {
                path: lock_path.to_path_buf(),
                waited_ms: waited.as_millis() as u64,
            });
        }
        std::thread::sleep(delay.min(timeout - waited));
        delay = (delay * 2).min(cap);
    }
}

fn lock_is_stale(lock_path: &Path, stale_after_ms: u64) -> bool {
    fs::metadata(lock_path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age >= Duration::from_millis(stale_after_ms))
}

/// Atomic, locked store for one JSON settings document.
///
/// The store is an explicit value: its path, lock path, and retry policy are
/// all members. Mutations write a `.backup` sibling before the document
/// changes and commit through a temp file + rename in the same directory, so
/// a reader never observes a partial write.
pub struct JsonFileStore<T> {
    path: PathBuf,
    lock_path: PathBuf,
    lock_cfg: LockConfig,
    _doc: PhantomData<T>,
}

impl<T> JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: PathBuf, lock_cfg: LockConfig) -> Self {
        let lock_path = sibling(&path, ".lock");
        Self {
            path,
            lock_path,
            lock_cfg,
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.path, ".backup")
    }

    /// Read the document; an absent file is an empty document
    pub fn load(&self) -> Result<T> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        serde_json::from_str(&raw).map_err(|err| {
            let offset = byte_offset(&raw, err.line(), err.column());
            anyhow::anyhow!(
                "Failed to parse {}: {err} (line {}, column {}, byte {offset})",
                self.path.display(),
                err.line(),
                err.column()
            )
        })
    }

    /// Read-modify-write under the scope lock.
    ///
    /// The lock is released on every exit path, including errors, through
    /// the guard's drop.
    pub fn mutate<F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let _guard = acquire_lock(&self.lock_path, &self.lock_cfg)?;

        let mut doc = self.load()?;

        if self.path.exists() {
            fs::copy(&self.path, self.backup_path()).with_context(|| {
                format!("Failed to write backup for {}", self.path.display())
            })?;
        }

        f(&mut doc)?;
        self.commit(&doc)?;
        Ok(doc)
    }

    /// Serialize and atomically replace the document file
    fn commit(&self, doc: &T) -> Result<()> {
        let parent = self
            .path
            .parent()
            .context("settings path has no parent directory")?;
        let json = serde_json::to_string_pretty(doc)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        temp.write_all(json.as_bytes())?;
        temp.write_all(b"\n")?;
        temp.flush()?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to commit {}", self.path.display()))?;
        Ok(())
    }

    /// Restore the document from its `.backup` sibling, if one exists
    pub fn restore_backup(&self) -> Result<bool> {
        let backup = self.backup_path();
        if !backup.exists() {
            return Ok(false);
        }
        fs::copy(&backup, &self.path)
            .with_context(|| format!("Failed to restore {}", self.path.display()))?;
        Ok(true)
    }
}

/// Store for a scope's extension settings document
pub type SettingsStore = JsonFileStore<SettingsDoc>;

impl SettingsStore {
    /// Append one record to its kind's list
    pub fn add_extension(&self, record: ExtensionRecord) -> Result<SettingsDoc> {
        self.mutate(|doc| {
            if doc.find(record.kind, &record.name).is_some() {
                anyhow::bail!(
                    "a {} named {:?} is already installed in this scope",
                    record.kind,
                    record.name
                );
            }
            doc.records_mut(record.kind).push(record.clone());
            Ok(())
        })
    }

    /// Drop one record by kind and name
    pub fn remove_extension(&self, kind: ExtensionKind, name: &str) -> Result<SettingsDoc> {
        self.mutate(|doc| {
            let records = doc.records_mut(kind);
            let before = records.len();
            records.retain(|r| r.name != name);
            if records.len() == before {
                anyhow::bail!("no {kind} named {name:?} is installed in this scope");
            }
            Ok(())
        })
    }
}

/// Apply two mutations across stores in a fixed order.
///
/// This is not globally atomic: the first store commits before the second
/// starts. When the second fails, the first is rolled back from the backup
/// its own mutation just produced.
pub fn mutate_pair<T, U, F, G>(
    first: &JsonFileStore<T>,
    second: &JsonFileStore<U>,
    f: F,
    g: G,
) -> Result<()>
where
    T: Serialize + DeserializeOwned + Default,
    U: Serialize + DeserializeOwned + Default,
    F: FnOnce(&mut T) -> Result<()>,
    G: FnOnce(&mut U) -> Result<()>,
{
    first.mutate(f)?;
    if let Err(err) = second.mutate(g) {
        // No backup means the first mutation created the file; removing it
        // restores the pre-pair state.
        if let Ok(false) = first.restore_backup() {
            let _ = fs::remove_file(first.path());
        }
        return Err(err).context("second-scope mutation failed; first scope was rolled back");
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn byte_offset(raw: &str, line: usize, column: usize) -> usize {
    let prior: usize = raw
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    prior + column.saturating_sub(1)
}
