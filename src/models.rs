use crate::constants::{AGENTS_DIR, COMMANDS_DIR, HOOKS_DIR, MCPS_DIR, SCOPE_ROOT_DIR};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The four extension kinds PACC installs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    Hook,
    Mcp,
    Agent,
    Command,
}

impl ExtensionKind {
    /// Every kind, in canonical order
    pub const ALL: [ExtensionKind; 4] = [
        ExtensionKind::Hook,
        ExtensionKind::Mcp,
        ExtensionKind::Agent,
        ExtensionKind::Command,
    ];

    /// Canonical install directory name under a scope root
    pub fn dir_name(&self) -> &'static str {
        match self {
            ExtensionKind::Hook => HOOKS_DIR,
            ExtensionKind::Mcp => MCPS_DIR,
            ExtensionKind::Agent => AGENTS_DIR,
            ExtensionKind::Command => COMMANDS_DIR,
        }
    }

    /// Plural key used in settings and manifest documents
    pub fn settings_key(&self) -> &'static str {
        match self {
            ExtensionKind::Hook => "hooks",
            ExtensionKind::Mcp => "mcps",
            ExtensionKind::Agent => "agents",
            ExtensionKind::Command => "commands",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionKind::Hook => "hook",
            ExtensionKind::Mcp => "mcp",
            ExtensionKind::Agent => "agent",
            ExtensionKind::Command => "command",
        }
    }

    /// Map a directory name back to a kind, if it is one of the canonical four
    pub fn from_dir_name(dir: &str) -> Option<Self> {
        match dir {
            HOOKS_DIR => Some(ExtensionKind::Hook),
            MCPS_DIR => Some(ExtensionKind::Mcp),
            AGENTS_DIR => Some(ExtensionKind::Agent),
            COMMANDS_DIR => Some(ExtensionKind::Command),
            _ => None,
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtensionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hook" | "hooks" => Ok(ExtensionKind::Hook),
            "mcp" | "mcps" => Ok(ExtensionKind::Mcp),
            "agent" | "agents" => Ok(ExtensionKind::Agent),
            "command" | "commands" => Ok(ExtensionKind::Command),
            other => bail!("unknown extension type: {other}"),
        }
    }
}

/// Where a record installs: the user's home configuration or a project's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Project,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User => f.write_str("user"),
            Scope::Project => f.write_str("project"),
        }
    }
}

/// Resolved filesystem layout for one scope
#[derive(Debug, Clone)]
pub struct ScopePaths {
    pub scope: Scope,
    /// The `.claude` directory this scope installs into
    pub root: PathBuf,
}

impl ScopePaths {
    /// User scope rooted at the given home directory
    pub fn user(home: &Path) -> Self {
        Self {
            scope: Scope::User,
            root: home.join(SCOPE_ROOT_DIR),
        }
    }

    /// Project scope rooted at the given project directory
    pub fn project(project_dir: &Path) -> Self {
        Self {
            scope: Scope::Project,
            root: project_dir.join(SCOPE_ROOT_DIR),
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(crate::constants::SETTINGS_FILE)
    }

    pub fn plugin_settings_path(&self) -> PathBuf {
        self.root.join(crate::constants::PLUGIN_SETTINGS_FILE)
    }

    pub fn kind_dir(&self, kind: ExtensionKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn plugin_repos_dir(&self) -> PathBuf {
        self.root.join(crate::constants::PLUGIN_REPOS_DIR)
    }
}

/// Outcome of the most recent validation of an installed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Warning,
    Error,
    #[default]
    Unknown,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Warning => "warning",
            ValidationStatus::Error => "error",
            ValidationStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One installed extension, as persisted in a scope's settings document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionRecord {
    pub name: String,
    pub kind: ExtensionKind,
    /// Origin the record was installed from: local path, URL, or owner/repo
    pub source: String,
    /// Install location relative to the scope root
    pub path: String,
    pub version: String,
    /// RFC-3339 UTC timestamp
    pub installed_at: String,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Hook: events the hook subscribes to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
    /// Hook: glob matchers narrowing the events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Vec<String>>,
    /// MCP: executable and arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Agent: model hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Command: alternate slash triggers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
}

impl ExtensionRecord {
    /// Create a record with the required fields; kind-specific fields start unset
    pub fn new(name: &str, kind: ExtensionKind, source: &str, path: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            source: source.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            installed_at: chrono::Utc::now().to_rfc3339(),
            validation_status: ValidationStatus::Unknown,
            dependencies: Vec::new(),
            events: None,
            matchers: None,
            command: None,
            args: None,
            model: None,
            tools: None,
            aliases: None,
        }
    }
}

/// The settings document of one scope.
///
/// Top-level keys PACC does not own are preserved verbatim across mutations
/// through the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SettingsDoc {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<ExtensionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcps: Vec<ExtensionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<ExtensionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<ExtensionRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsDoc {
    pub fn records(&self, kind: ExtensionKind) -> &Vec<ExtensionRecord> {
        match kind {
            ExtensionKind::Hook => &self.hooks,
            ExtensionKind::Mcp => &self.mcps,
            ExtensionKind::Agent => &self.agents,
            ExtensionKind::Command => &self.commands,
        }
    }

    pub fn records_mut(&mut self, kind: ExtensionKind) -> &mut Vec<ExtensionRecord> {
        match kind {
            ExtensionKind::Hook => &mut self.hooks,
            ExtensionKind::Mcp => &mut self.mcps,
            ExtensionKind::Agent => &mut self.agents,
            ExtensionKind::Command => &mut self.commands,
        }
    }

    /// Find a record by name within one kind
    pub fn find(&self, kind: ExtensionKind, name: &str) -> Option<&ExtensionRecord> {
        self.records(kind).iter().find(|r| r.name == name)
    }

    /// Find records sharing a name across every kind
    pub fn find_any_kind(&self, name: &str) -> Vec<&ExtensionRecord> {
        ExtensionKind::ALL
            .iter()
            .flat_map(|k| self.records(*k).iter())
            .filter(|r| r.name == name)
            .collect()
    }

    /// Total record count across every kind
    pub fn len(&self) -> usize {
        ExtensionKind::ALL.iter().map(|k| self.records(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One validation finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Issue {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn with_file(mut self, file: &Path) -> Self {
        self.file = Some(file.display().to_string());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Result of validating one file or directory.
///
/// Validators collect every finding rather than failing fast, so a single
/// run reports the complete picture.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    /// Fields extracted while validating (name, version, events, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn error(&mut self, code: &str, message: impl Into<String>) {
        self.errors.push(Issue::new(code, message));
        self.valid = false;
    }

    pub fn error_at(&mut self, code: &str, message: impl Into<String>, line: usize) {
        self.errors.push(Issue::new(code, message).with_line(line));
        self.valid = false;
    }

    pub fn warn(&mut self, code: &str, message: impl Into<String>) {
        self.warnings.push(Issue::new(code, message));
    }

    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Fold another result into this one, keeping issue order
    pub fn merge(&mut self, other: ValidationResult) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        for (k, v) in other.metadata {
            self.metadata.entry(k).or_insert(v);
        }
    }

    /// Status summary suitable for an installed record
    pub fn status(&self) -> ValidationStatus {
        if !self.valid {
            ValidationStatus::Error
        } else if !self.warnings.is_empty() {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Valid
        }
    }
}

/// The `plugin.json` manifest at the root of a plugin directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// One cloned plugin repository, as tracked in the plugin settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginRepoRecord {
    pub owner: String,
    pub repo: String,
    /// Clone location relative to the scope root
    pub path: String,
    pub url: String,
    pub current_commit: String,
    /// RFC-3339 UTC timestamp of the last clone or successful update
    pub last_updated: String,
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl PluginRepoRecord {
    /// The `owner/repo` identifier this record is keyed by
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// The plugin settings document: tracked repositories plus the enabled set
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PluginSettings {
    #[serde(default)]
    pub repositories: Map<String, Value>,
    /// owner/repo → enabled plugin names
    #[serde(default)]
    pub enabled: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginSettings {
    pub fn repo_record(&self, id: &str) -> Option<PluginRepoRecord> {
        self.repositories
            .get(id)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_repo_record(&mut self, record: &PluginRepoRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.repositories.insert(record.id(), value);
        Ok(())
    }

    pub fn enabled_plugins(&self, id: &str) -> Vec<String> {
        self.enabled
            .get(id)
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_enabled_plugins(&mut self, id: &str, plugins: Vec<String>) {
        if plugins.is_empty() {
            self.enabled.remove(id);
        } else {
            let values = plugins.into_iter().map(Value::String).collect();
            self.enabled.insert(id.to_string(), Value::Array(values));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in ExtensionKind::ALL {
            let parsed: ExtensionKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
            let from_dir = ExtensionKind::from_dir_name(kind.dir_name()).unwrap();
            assert_eq!(from_dir, kind);
        }
    }

    #[test]
    fn test_kind_accepts_plural() {
        let parsed: ExtensionKind = "hooks".parse().unwrap();
        assert_eq!(parsed, ExtensionKind::Hook);
        assert!("widget".parse::<ExtensionKind>().is_err());
    }

    #[test]
    fn test_scope_paths_layout() {
        let paths = ScopePaths::project(Path::new("/work/app"));
        assert_eq!(paths.root, PathBuf::from("/work/app/.claude"));
        assert_eq!(
            paths.settings_path(),
            PathBuf::from("/work/app/.claude/settings.json")
        );
        assert_eq!(
            paths.kind_dir(ExtensionKind::Hook),
            PathBuf::from("/work/app/.claude/hooks")
        );
        assert_eq!(
            paths.plugin_repos_dir(),
            PathBuf::from("/work/app/.claude/plugins/repos")
        );
    }

    #[test]
    fn test_settings_doc_preserves_unknown_keys() {
        let raw = r#"{
            "hooks": [],
            "permissions": {"allow": ["Bash"]},
            "theme": "dark"
        }"#;
        let doc: SettingsDoc = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.extra.get("theme").unwrap(), "dark");

        let out = serde_json::to_value(&doc).unwrap();
        assert_eq!(out["permissions"]["allow"][0], "Bash");
        assert_eq!(out["theme"], "dark");
    }

    #[test]
    fn test_settings_doc_find_across_kinds() {
        let mut doc = SettingsDoc::default();
        doc.hooks
            .push(ExtensionRecord::new("fmt", ExtensionKind::Hook, "./a", "hooks/a.json", "1.0.0"));
        doc.agents
            .push(ExtensionRecord::new("fmt", ExtensionKind::Agent, "./b", "agents/b.md", "1.0.0"));

        assert_eq!(doc.find_any_kind("fmt").len(), 2);
        assert!(doc.find(ExtensionKind::Hook, "fmt").is_some());
        assert!(doc.find(ExtensionKind::Mcp, "fmt").is_none());
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_validation_result_status() {
        let mut result = ValidationResult::new();
        assert_eq!(result.status(), ValidationStatus::Valid);

        result.warn("W001", "missing description");
        assert_eq!(result.status(), ValidationStatus::Warning);

        result.error("E001", "missing name");
        assert!(!result.valid);
        assert_eq!(result.status(), ValidationStatus::Error);
    }

    #[test]
    fn test_validation_result_merge_keeps_order() {
        let mut first = ValidationResult::new();
        first.error("E001", "a");
        let mut second = ValidationResult::new();
        second.error("E002", "b");
        second.warn("W001", "c");

        first.merge(second);
        assert_eq!(first.errors.len(), 2);
        assert_eq!(first.errors[0].code, "E001");
        assert_eq!(first.errors[1].code, "E002");
        assert_eq!(first.warnings.len(), 1);
    }

    #[test]
    fn test_record_serialization_skips_unset_fields() {
        let record = ExtensionRecord::new("h", ExtensionKind::Hook, "./h.json", "hooks/h.json", "1.0.0");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("events").is_none());
        assert!(json.get("aliases").is_none());
        assert_eq!(json["kind"], "hook");
    }

    #[test]
    fn test_record_full_round_trip() {
        let mut record = ExtensionRecord::new("fmt", ExtensionKind::Hook, "./fmt.json", "hooks/fmt.json", "1.2.0");
        record.events = Some(vec!["PostToolUse".into()]);
        record.matchers = Some(vec!["*.rs".into()]);
        record.dependencies = vec!["base".into()];
        record.validation_status = ValidationStatus::Warning;

        let json = serde_json::to_string(&record).unwrap();
        let parsed: ExtensionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.validation_status, ValidationStatus::Warning);
    }

    #[test]
    fn test_plugin_settings_enabled_set() {
        let mut settings = PluginSettings::default();
        settings.set_enabled_plugins("acme/tools", vec!["linter".to_string()]);
        assert_eq!(settings.enabled_plugins("acme/tools"), vec!["linter"]);

        settings.set_enabled_plugins("acme/tools", Vec::new());
        assert!(settings.enabled_plugins("acme/tools").is_empty());
        assert!(!settings.enabled.contains_key("acme/tools"));
    }
}
