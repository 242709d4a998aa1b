pub mod config;
pub mod constants;
pub mod detector;
pub mod formats;
pub mod fragments;
pub mod git;
pub mod installer;
pub mod models;
pub mod output;
pub mod plugins;
pub mod project;
pub mod settings;
pub mod sources;
pub mod utils;
pub mod validators;

pub use installer::{InstallOptions, Installer, RemoveOptions, SelectAll, Selector};
pub use models::{ExtensionKind, ExtensionRecord, Scope, ScopePaths, SettingsDoc, ValidationResult};
pub use settings::SettingsStore;
pub use sources::SourceResolver;
pub use validators::ValidatorRegistry;
