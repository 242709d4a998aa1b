use crate::constants::{
    AGENT_KEYWORDS, COMMAND_KEYWORDS, DETECTOR_MAX_ANCESTORS, DETECTOR_SCORE_THRESHOLD,
    HOOK_KEYWORDS, MCP_KEYWORDS, PROJECT_MANIFEST,
};
use crate::models::ExtensionKind;
use crate::utils::walk_files;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Classify a file as one of the extension kinds.
///
/// Three tiers apply in order and the first definitive answer wins: a
/// declaration in the project's `pacc.json`, then the canonical directory
/// the file sits under, then content keyword scoring. Directory placement
/// always beats content, so a file inside `commands/` is a command no matter
/// how agent-like its vocabulary reads.
pub fn detect(file: &Path, project_root: Option<&Path>) -> Option<ExtensionKind> {
    if let Some(root) = project_root {
        if let Some(kind) = detect_by_declaration(file, root) {
            return Some(kind);
        }
    }

    if let Some(kind) = detect_by_directory(file, project_root) {
        return Some(kind);
    }

    detect_by_content(file)
}

/// Tier 1: an `extensions.<kind>[*].source` entry in `pacc.json` that
/// resolves to this file declares its kind outright.
fn detect_by_declaration(file: &Path, project_root: &Path) -> Option<ExtensionKind> {
    let manifest_path = project_root.join(PROJECT_MANIFEST);
    let raw = std::fs::read_to_string(&manifest_path).ok()?;
    let doc: Value = serde_json::from_str(&raw).ok()?;
    let extensions = doc.get("extensions")?.as_object()?;
    let target = file.canonicalize().ok()?;

    for kind in ExtensionKind::ALL {
        let Some(specs) = extensions.get(kind.settings_key()).and_then(Value::as_array) else {
            continue;
        };
        for spec in specs {
            let Some(source) = spec.get("source").and_then(Value::as_str) else {
                continue;
            };
            let declared = project_root.join(source);
            if declared.canonicalize().is_ok_and(|p| p == target) {
                return Some(kind);
            }
        }
    }
    None
}

/// Tier 2: walk upward looking for a canonical kind directory
fn detect_by_directory(file: &Path, project_root: Option<&Path>) -> Option<ExtensionKind> {
    let mut current = file.parent();
    let mut depth = 0;

    while let Some(dir) = current {
        if let Some(root) = project_root {
            if !dir.starts_with(root) {
                break;
            }
        } else if depth >= DETECTOR_MAX_ANCESTORS {
            break;
        }

        if let Some(kind) = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(ExtensionKind::from_dir_name)
        {
            return Some(kind);
        }

        current = dir.parent();
        depth += 1;
    }
    None
}

/// Tier 3: weighted keyword scoring over the file body. Only kinds whose
/// file format matches the extension compete; the best score must clear a
/// threshold, and a tie yields no answer.
fn detect_by_content(file: &Path) -> Option<ExtensionKind> {
    let content = std::fs::read_to_string(file).ok()?.to_lowercase();
    let extension = crate::utils::get_extension(file)?;

    let tables: &[(ExtensionKind, &[(&str, u32)])] = match extension.as_str() {
        "json" => &[
            (ExtensionKind::Hook, HOOK_KEYWORDS),
            (ExtensionKind::Mcp, MCP_KEYWORDS),
        ],
        "md" | "markdown" => &[
            (ExtensionKind::Agent, AGENT_KEYWORDS),
            (ExtensionKind::Command, COMMAND_KEYWORDS),
        ],
        _ => return None,
    };

    let mut scores: Vec<(ExtensionKind, u32)> = tables
        .iter()
        .map(|(kind, table)| (*kind, score_content(&content, table)))
        .collect();
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (best_kind, best) = scores[0];
    let (_, runner_up) = scores[1];
    if best < DETECTOR_SCORE_THRESHOLD || best == runner_up {
        return None;
    }
    Some(best_kind)
}

fn score_content(content: &str, table: &[(&str, u32)]) -> u32 {
    table
        .iter()
        .map(|(keyword, weight)| {
            let count = content.matches(keyword).count().min(5) as u32;
            weight * count
        })
        .sum()
}

/// Run `detect` over every candidate file of a tree, grouped by kind.
/// Files no tier can place are gathered under the `unknown` key of the
/// second return value.
pub fn scan_directory(
    dir: &Path,
    project_root: Option<&Path>,
) -> (BTreeMap<ExtensionKind, Vec<PathBuf>>, Vec<PathBuf>) {
    let mut grouped: BTreeMap<ExtensionKind, Vec<PathBuf>> = BTreeMap::new();
    let mut unknown = Vec::new();

    for file in walk_files(dir, Some(&["json", "md", "markdown"]), false) {
        // Manifests describe extensions; they are not extensions themselves
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name == PROJECT_MANIFEST || name == "plugin.json" {
            continue;
        }
        match detect(&file, project_root) {
            Some(kind) => grouped.entry(kind).or_default().push(file),
            None => unknown.push(file),
        }
    }

    (grouped, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const AGENTISH: &str = "tool permission tool permission tool permission \
        tool permission tool permission tool permission tool permission";

    #[test]
    fn test_declaration_tier_wins() {
        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("misc")).unwrap();
        let file = project.path().join("misc/c.md");
        fs::write(&file, AGENTISH).unwrap();
        fs::write(
            project.path().join("pacc.json"),
            r#"{"name": "p", "version": "1.0.0", "extensions": {"commands": [{"name": "c", "source": "misc/c.md"}]}}"#,
        )
        .unwrap();

        let kind = detect(&file, Some(project.path()));
        assert_eq!(kind, Some(ExtensionKind::Command));
    }

    #[test]
    fn test_directory_tier_beats_content() {
        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("commands")).unwrap();
        let file = project.path().join("commands/c.md");
        fs::write(&file, AGENTISH).unwrap();

        // No declaration: the commands/ directory decides, despite the
        // agent-heavy vocabulary.
        let kind = detect(&file, Some(project.path()));
        assert_eq!(kind, Some(ExtensionKind::Command));
    }

    #[test]
    fn test_content_tier_when_unplaced() {
        let loose = TempDir::new().unwrap();
        let file = loose.path().join("c.md");
        fs::write(&file, AGENTISH).unwrap();

        let kind = detect(&file, None);
        assert_eq!(kind, Some(ExtensionKind::Agent));
    }

    #[test]
    fn test_content_tier_hook_json() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("h.json");
        fs::write(
            &file,
            r#"{"name": "h", "eventTypes": ["PreToolUse"], "commands": ["echo hi"]}"#,
        )
        .unwrap();

        assert_eq!(detect(&file, None), Some(ExtensionKind::Hook));
    }

    #[test]
    fn test_content_tier_mcp_json() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("srv.json");
        fs::write(
            &file,
            r#"{"mcpServers": {"db": {"transport": "stdio", "capabilities": ["tools"]}}}"#,
        )
        .unwrap();

        assert_eq!(detect(&file, None), Some(ExtensionKind::Mcp));
    }

    #[test]
    fn test_content_below_threshold_is_unknown() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, "Shopping list: apples, pears.").unwrap();

        assert_eq!(detect(&file, None), None);
    }

    #[test]
    fn test_directory_walk_is_bounded_without_root() {
        let dir = TempDir::new().unwrap();
        let mut nested = dir.path().join("hooks");
        for part in ["a", "b", "c", "d", "e", "f", "g"] {
            nested = nested.join(part);
        }
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("x.json");
        fs::write(&file, "{}").unwrap();

        // hooks/ sits beyond the bounded ancestor walk
        assert_eq!(detect_by_directory(&file, None), None);
    }

    #[test]
    fn test_scan_directory_groups_by_kind() {
        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("hooks")).unwrap();
        fs::create_dir_all(project.path().join("agents")).unwrap();
        fs::write(project.path().join("hooks/h.json"), "{}").unwrap();
        fs::write(project.path().join("agents/a.md"), "x").unwrap();
        fs::write(project.path().join("recipe.md"), "flour and water").unwrap();

        let (grouped, unknown) = scan_directory(project.path(), Some(project.path()));
        assert_eq!(grouped[&ExtensionKind::Hook].len(), 1);
        assert_eq!(grouped[&ExtensionKind::Agent].len(), 1);
        assert_eq!(unknown.len(), 1);
    }
}
