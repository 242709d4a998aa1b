use crate::constants::{ENABLE_PLUGINS_VAR, PROFILE_BLOCK_BEGIN, PROFILE_BLOCK_END};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Cmd,
    Unknown,
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Fish => "fish",
            Shell::PowerShell => "powershell",
            Shell::Cmd => "cmd",
            Shell::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Snapshot of the plugin-related environment
#[derive(Debug, Clone, Serialize)]
pub struct EnvStatus {
    pub platform: Platform,
    pub shell: Shell,
    pub enable_plugins_set: bool,
    pub enable_plugins_value: Option<String>,
    pub containerized: bool,
}

/// Detects the surrounding platform and maintains the `ENABLE_PLUGINS`
/// export in the user's shell profile.
pub struct EnvManager {
    home: PathBuf,
}

impl EnvManager {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    pub fn detect_platform() -> Platform {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unknown
        }
    }

    pub fn detect_shell() -> Shell {
        if let Ok(shell) = std::env::var("SHELL") {
            return shell_from_path(&shell);
        }
        if std::env::var("PSModulePath").is_ok() {
            return Shell::PowerShell;
        }
        if cfg!(target_os = "windows") {
            return Shell::Cmd;
        }
        Shell::Unknown
    }

    pub fn detect_container() -> bool {
        if Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists() {
            return true;
        }
        std::fs::read_to_string("/proc/1/cgroup")
            .map(|cgroup| {
                ["docker", "containerd", "kubepods", "lxc"]
                    .iter()
                    .any(|marker| cgroup.contains(marker))
            })
            .unwrap_or(false)
    }

    pub fn status(&self) -> EnvStatus {
        let value = std::env::var(ENABLE_PLUGINS_VAR).ok();
        EnvStatus {
            platform: Self::detect_platform(),
            shell: Self::detect_shell(),
            enable_plugins_set: value.is_some(),
            enable_plugins_value: value,
            containerized: Self::detect_container(),
        }
    }

    /// The canonical profile file for a shell
    pub fn profile_path(&self, shell: Shell) -> Result<PathBuf> {
        let path = match shell {
            Shell::Bash => self.home.join(".bashrc"),
            Shell::Zsh => self.home.join(".zshrc"),
            Shell::Fish => self.home.join(".config/fish/config.fish"),
            Shell::PowerShell => self
                .home
                .join(".config/powershell/Microsoft.PowerShell_profile.ps1"),
            Shell::Cmd | Shell::Unknown => {
                bail!("no profile handling for the {shell} shell; export {ENABLE_PLUGINS_VAR}=true manually")
            }
        };
        Ok(path)
    }

    /// The export line a shell needs
    pub fn export_line(shell: Shell) -> Result<String> {
        let line = match shell {
            Shell::Bash | Shell::Zsh => format!("export {ENABLE_PLUGINS_VAR}=true"),
            Shell::Fish => format!("set -x {ENABLE_PLUGINS_VAR} true"),
            Shell::PowerShell => format!("$env:{ENABLE_PLUGINS_VAR} = \"true\""),
            Shell::Cmd | Shell::Unknown => bail!("unsupported shell: {shell}"),
        };
        Ok(line)
    }

    /// Append the marked export block to the profile. Idempotent: a profile
    /// already carrying the correct block is left alone. The previous profile
    /// is kept in a `.pacc.backup` sibling.
    pub fn setup(&self, shell: Shell) -> Result<SetupOutcome> {
        let profile = self.profile_path(shell)?;
        let line = Self::export_line(shell)?;
        let current = match std::fs::read_to_string(&profile) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("Cannot read {}", profile.display()))
            }
        };

        if let Some(block) = marked_block(&current) {
            if block.contains(&line) {
                return Ok(SetupOutcome {
                    profile,
                    changed: false,
                });
            }
        }

        if let Some(parent) = profile.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        std::fs::write(backup_path(&profile), &current)
            .with_context(|| format!("Cannot back up {}", profile.display()))?;

        // Replace a stale block or append a fresh one
        let stripped = strip_marked_block(&current);
        let mut updated = stripped;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&format!(
            "{PROFILE_BLOCK_BEGIN}\n{line}\n{PROFILE_BLOCK_END}\n"
        ));
        std::fs::write(&profile, updated)
            .with_context(|| format!("Cannot write {}", profile.display()))?;

        Ok(SetupOutcome {
            profile,
            changed: true,
        })
    }

    /// Check the running process's environment for the exact value `true`
    pub fn verify(&self) -> VerifyReport {
        let value = std::env::var(ENABLE_PLUGINS_VAR).ok();
        let ok = value.as_deref() == Some("true");
        let detail = match &value {
            None => format!("{ENABLE_PLUGINS_VAR} is not set in this environment"),
            Some(v) if v == "true" => format!("{ENABLE_PLUGINS_VAR}=true"),
            Some(v) => {
                format!("{ENABLE_PLUGINS_VAR} is set to {v:?}; plugins require the literal \"true\"")
            }
        };
        VerifyReport { ok, value, detail }
    }

    /// Remove the marked block, restoring the backup when one exists
    pub fn reset(&self, shell: Shell) -> Result<SetupOutcome> {
        let profile = self.profile_path(shell)?;
        let backup = backup_path(&profile);

        if backup.exists() {
            std::fs::copy(&backup, &profile)
                .with_context(|| format!("Cannot restore {}", profile.display()))?;
            std::fs::remove_file(&backup)?;
            return Ok(SetupOutcome {
                profile,
                changed: true,
            });
        }

        let current = match std::fs::read_to_string(&profile) {
            Ok(content) => content,
            Err(_) => {
                return Ok(SetupOutcome {
                    profile,
                    changed: false,
                })
            }
        };
        let stripped = strip_marked_block(&current);
        let changed = stripped != current;
        if changed {
            std::fs::write(&profile, stripped)
                .with_context(|| format!("Cannot write {}", profile.display()))?;
        }
        Ok(SetupOutcome { profile, changed })
    }
}

#[derive(Debug)]
pub struct SetupOutcome {
    pub profile: PathBuf,
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub ok: bool,
    pub value: Option<String>,
    pub detail: String,
}

fn shell_from_path(shell: &str) -> Shell {
    match Path::new(shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
    {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "pwsh" | "powershell" => Shell::PowerShell,
        "cmd" | "cmd.exe" => Shell::Cmd,
        _ => Shell::Unknown,
    }
}

fn backup_path(profile: &Path) -> PathBuf {
    let mut name = profile.file_name().unwrap_or_default().to_os_string();
    name.push(".pacc.backup");
    profile.with_file_name(name)
}

/// The marked block's content, when present
fn marked_block(content: &str) -> Option<&str> {
    let start = content.find(PROFILE_BLOCK_BEGIN)?;
    let end = content[start..].find(PROFILE_BLOCK_END)?;
    Some(&content[start..start + end])
}

/// Profile content with the marked block removed
fn strip_marked_block(content: &str) -> String {
    let Some(start) = content.find(PROFILE_BLOCK_BEGIN) else {
        return content.to_string();
    };
    let Some(end_rel) = content[start..].find(PROFILE_BLOCK_END) else {
        return content.to_string();
    };
    let mut end = start + end_rel + PROFILE_BLOCK_END.len();
    if content[end..].starts_with('\n') {
        end += 1;
    }
    let mut result = String::new();
    result.push_str(&content[..start]);
    result.push_str(&content[end..]);
    result
}
