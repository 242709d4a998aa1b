use crate::constants::SKIPPED_DIR_NAMES;
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Expand `~` and make a user-supplied path absolute and canonical
pub fn normalize_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(path)
    };
    absolute
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", absolute.display()))
}

/// Test whether `path` resolves inside `root`.
///
/// Both sides are canonicalized, so a symlink whose target escapes the root
/// fails the test. A path that cannot be canonicalized is not contained.
pub fn is_contained(path: &Path, root: &Path) -> bool {
    let root = match root.canonicalize() {
        Ok(r) => r,
        Err(_) => return false,
    };
    match path.canonicalize() {
        Ok(p) => p.starts_with(&root),
        Err(_) => {
            // The path may not exist yet; canonicalize the nearest existing
            // ancestor and re-append the remainder.
            let mut existing = path.to_path_buf();
            let mut tail = Vec::new();
            while !existing.exists() {
                match existing.file_name() {
                    Some(name) => {
                        tail.push(name.to_os_string());
                        existing.pop();
                    }
                    None => return false,
                }
            }
            if tail.iter().any(|part| part == "..") {
                return false;
            }
            let Ok(mut resolved) = existing.canonicalize() else {
                return false;
            };
            for part in tail.iter().rev() {
                resolved.push(part);
            }
            resolved.starts_with(&root)
        }
    }
}

/// True if any component of the path is `..`
pub fn has_parent_segments(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Iterate the files of a tree.
///
/// Symlinks are not followed, which also makes the walk cycle-safe. Hidden
/// entries are skipped unless `include_hidden` is set, and well-known build
/// and VCS directories are always skipped.
pub fn walk_files(root: &Path, extensions: Option<&[&str]>, include_hidden: bool) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if SKIPPED_DIR_NAMES.contains(&name.as_ref()) {
                return false;
            }
            include_hidden || !name.starts_with('.')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| match extensions {
            Some(wanted) => get_extension(path)
                .map(|ext| wanted.contains(&ext.as_str()))
                .unwrap_or(false),
            None => true,
        })
        .collect()
}

/// Get file extension from path (without the dot)
pub fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

/// File name without its extension
pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

/// Read a file to a string with a scoped open; the handle closes on return
pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Case-insensitive `*` wildcard match, for name filters
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    if !pattern.contains('*') {
        return pattern == text;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = text.as_str();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(at) => {
                // The first segment is anchored to the start, the last to the end
                if i == 0 && at != 0 {
                    return false;
                }
                rest = &rest[at + segment.len()..];
            }
            None => return false,
        }
    }
    if let Some(last) = segments.last() {
        if !last.is_empty() && !text.ends_with(last) {
            return false;
        }
    }
    true
}
