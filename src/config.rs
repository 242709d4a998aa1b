use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// PACC tunables loaded from settings.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaccConfig {
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Total time to keep retrying lock acquisition before failing (ms)
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
    /// First retry delay; doubles per attempt up to `backoff_cap_ms`
    #[serde(default = "default_backoff_start_ms")]
    pub backoff_start_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// A lockfile older than this is considered abandoned and taken over (ms)
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Timeout applied to every git subprocess (seconds)
    #[serde(default = "default_git_timeout_secs")]
    pub timeout_secs: u64,
    /// Clone with --depth 1 unless disabled
    #[serde(default = "default_shallow")]
    pub shallow_clone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_fetch_max_redirects")]
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstallConfig {
    /// Treat validation warnings as blocking
    #[serde(default)]
    pub strict: bool,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_backoff_start_ms() -> u64 {
    10
}

fn default_backoff_cap_ms() -> u64 {
    160
}

fn default_stale_after_ms() -> u64 {
    30_000
}

fn default_git_timeout_secs() -> u64 {
    120
}

fn default_shallow() -> bool {
    true
}

fn default_fetch_max_bytes() -> u64 {
    crate::constants::FETCH_MAX_BYTES
}

fn default_fetch_max_redirects() -> usize {
    crate::constants::FETCH_MAX_REDIRECTS
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
            backoff_start_ms: default_backoff_start_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_git_timeout_secs(),
            shallow_clone: default_shallow(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_fetch_max_bytes(),
            max_redirects: default_fetch_max_redirects(),
        }
    }
}

impl Default for PaccConfig {
    fn default() -> Self {
        Self {
            lock: LockConfig::default(),
            git: GitConfig::default(),
            fetch: FetchConfig::default(),
            install: InstallConfig::default(),
        }
    }
}

impl PaccConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: PaccConfig =
            toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration from default locations or return defaults
    pub fn load() -> Result<Self> {
        let default_paths = [
            PathBuf::from("./pacc.toml"),
            PathBuf::from(shellexpand::tilde("~/.config/pacc/settings.toml").as_ref()),
        ];

        for path in &default_paths {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }
}
