use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One reversible file-system action taken during an operation
#[derive(Debug)]
enum Action {
    /// A file this operation created; rewind deletes it
    Created(PathBuf),
    /// A file this operation overwrote or deleted; rewind restores the bytes
    Replaced { path: PathBuf, previous: Vec<u8> },
    /// A directory this operation created; rewind removes it when empty
    CreatedDir(PathBuf),
}

/// In-memory record of the file-system phase, consumed in reverse on failure.
///
/// The log only ever touches paths it recorded, so replaying it cannot reach
/// outside the operation's own footprint.
#[derive(Debug, Default)]
pub struct RewindLog {
    actions: Vec<Action>,
}

impl RewindLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record directories created for a destination, outermost first
    pub fn record_created_dirs(&mut self, leaf: &Path, existing_ancestor: &Path) {
        let mut created: Vec<PathBuf> = Vec::new();
        let mut current = leaf;
        while current != existing_ancestor && current.starts_with(existing_ancestor) {
            created.push(current.to_path_buf());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        // Reverse so rewind (which walks the log backwards) removes leaves first
        for dir in created.into_iter().rev() {
            self.actions.push(Action::CreatedDir(dir));
        }
    }

    pub fn record_created(&mut self, path: &Path) {
        self.actions.push(Action::Created(path.to_path_buf()));
    }

    /// Capture a file's bytes before it is overwritten or deleted
    pub fn record_replaced(&mut self, path: &Path) -> Result<()> {
        let previous = fs::read(path)
            .with_context(|| format!("Failed to snapshot {}", path.display()))?;
        self.actions.push(Action::Replaced {
            path: path.to_path_buf(),
            previous,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Undo every recorded action in reverse order.
    ///
    /// Replay keeps going past individual failures so one stubborn path does
    /// not strand the rest of the rewind; the first error is reported.
    pub fn replay(self) -> Result<()> {
        let mut first_error = None;
        for action in self.actions.into_iter().rev() {
            let outcome = match action {
                Action::Created(path) => {
                    fs::remove_file(&path)
                        .with_context(|| format!("Failed to remove {}", path.display()))
                }
                Action::Replaced { path, previous } => fs::write(&path, previous)
                    .with_context(|| format!("Failed to restore {}", path.display())),
                Action::CreatedDir(path) => match fs::remove_dir(&path) {
                    Ok(()) => Ok(()),
                    // Leave non-empty or already-removed directories alone
                    Err(_) => Ok(()),
                },
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
