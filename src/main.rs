use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pacc::{
    config::PaccConfig,
    detector,
    installer::{InstallOptions, Installer, RemoveOptions, SelectAll, Selector},
    models::{ExtensionKind, ExtensionRecord, Scope, ScopePaths},
    output::{CommandReport, EXIT_INTERRUPTED},
    plugins::{parse_plugin_id, EnvManager, PluginSearch, PluginService, UpdateStatus},
    project::{ProjectManifest, SyncEngine, SyncStatus},
    settings::SettingsStore,
    sources::SourceResolver,
    validators::{FragmentValidator, PluginValidator, ValidatorRegistry},
};
use serde_json::json;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "pacc")]
#[command(about = "PACC - package manager for Claude Code extensions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install extensions from a file, directory, URL, or Git repository
    Install {
        /// Path, https URL, or owner/repo identifier
        source: String,
        /// Install into the user scope (~/.claude)
        #[arg(long, conflicts_with = "project")]
        user: bool,
        /// Install into the project scope (./.claude)
        #[arg(long)]
        project: bool,
        /// Restrict to one extension type
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<String>,
        /// Overwrite existing files and records
        #[arg(long)]
        force: bool,
        /// Report the plan without changing anything
        #[arg(long)]
        dry_run: bool,
        /// Choose candidates interactively
        #[arg(long, short)]
        interactive: bool,
        /// Install every candidate without prompting
        #[arg(long, conflicts_with = "interactive")]
        all: bool,
        /// Treat validation warnings as blocking
        #[arg(long)]
        strict: bool,
        /// Record the install in the project's pacc.json
        #[arg(long)]
        save: bool,
        /// Emit a single JSON object
        #[arg(long)]
        json: bool,
    },
    /// Remove an installed extension
    Remove {
        /// Installed extension name
        name: String,
        #[arg(long, conflicts_with = "project")]
        user: bool,
        #[arg(long)]
        project: bool,
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        confirm: bool,
        #[arg(long)]
        dry_run: bool,
        /// Remove even when other extensions depend on it
        #[arg(long)]
        force: bool,
        /// Drop the entry from the project's pacc.json too
        #[arg(long)]
        save: bool,
        #[arg(long)]
        json: bool,
    },
    /// List installed extensions
    List {
        /// Restrict to one extension type
        kind: Option<String>,
        #[arg(long, conflicts_with_all = ["project", "all"])]
        user: bool,
        #[arg(long, conflicts_with = "all")]
        project: bool,
        /// Both scopes
        #[arg(long)]
        all: bool,
        /// Output format
        #[arg(long, value_parser = ["table", "list", "json"], default_value = "table")]
        format: String,
        /// Wildcard filter on names, e.g. 'fmt*'
        #[arg(long)]
        filter: Option<String>,
        /// Substring search over names and sources
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = ["name", "type", "date"], default_value = "name")]
        sort: String,
        /// Re-check each record's file before listing
        #[arg(long)]
        show_status: bool,
    },
    /// Show details for a file or an installed extension
    Info {
        /// Path or installed name
        source: String,
        #[arg(long, conflicts_with = "project")]
        user: bool,
        #[arg(long)]
        project: bool,
        #[arg(long)]
        json: bool,
        /// List other installed extensions of the same kind
        #[arg(long)]
        show_related: bool,
        /// Print usage hints for the extension kind
        #[arg(long)]
        show_usage: bool,
        /// Print troubleshooting hints for the extension kind
        #[arg(long)]
        show_troubleshooting: bool,
    },
    /// Validate a file or directory without installing
    Validate {
        source: String,
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<String>,
        /// Fail on warnings too
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        json: bool,
    },
    /// Initialize the current directory for PACC
    Init {
        /// Also write a pacc.json project manifest
        #[arg(long)]
        project_config: bool,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "0.1.0")]
        version: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Install the project manifest's extensions
    Sync {
        /// Apply a named environment overlay
        #[arg(long)]
        environment: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// Manage plugin repositories
    Plugin {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Subcommand)]
enum PluginCommands {
    /// Clone a plugin repository and track it
    Install {
        /// Repository URL or owner/repo
        url: String,
        /// Enable one plugin from the repository
        #[arg(long)]
        plugin: Option<String>,
        /// Enable every plugin in the repository
        #[arg(long, conflicts_with = "plugin")]
        all: bool,
        /// Shorthand for --all
        #[arg(long)]
        enable: bool,
        #[arg(long)]
        json: bool,
    },
    /// List tracked repositories and their plugins
    List {
        /// Only installed plugins (the default view)
        #[arg(long)]
        installed: bool,
        /// Catalog entries not yet installed
        #[arg(long, conflicts_with_all = ["installed", "enabled"])]
        available: bool,
        /// Only plugins exposing this component type
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<String>,
        /// Only enabled plugins
        #[arg(long)]
        enabled: bool,
        #[arg(long)]
        json: bool,
    },
    /// Enable a plugin (owner/repo:name)
    Enable { id: String },
    /// Disable a plugin (owner/repo:name)
    Disable { id: String },
    /// Fetch and fast-forward tracked repositories
    Update {
        /// One repository URL or owner/repo; all when omitted
        url: Option<String>,
        /// Report available updates without applying them
        #[arg(long)]
        check: bool,
        /// Update every tracked repository (the default when no url is given)
        #[arg(long, conflicts_with = "url")]
        all: bool,
        /// Hard-reset to the remote tip when fast-forward fails (destructive)
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Remove a plugin or a whole repository
    Remove { name: String },
    /// Show details for an installed plugin
    Info {
        name: String,
        /// Treat the name as an owner/repo and show the repository record
        #[arg(long)]
        repository: bool,
        #[arg(long)]
        json: bool,
    },
    /// Search the plugin catalog
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Align clones with their pinned commits
    Sync {
        /// One repository URL or owner/repo; all when omitted
        url: Option<String>,
        /// Report drift without changing trees
        #[arg(long)]
        check: bool,
        /// Reset even repositories with local modifications
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Manage the ENABLE_PLUGINS environment variable
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// Show platform, shell, and variable state
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Write the export line to the shell profile
    Setup,
    /// Check the running environment
    Verify {
        #[arg(long)]
        json: bool,
    },
    /// Remove the export line and restore the profile backup
    Reset,
}

/// dialoguer-backed implementation of the selection seam
struct DialoguerSelector;

impl Selector for DialoguerSelector {
    fn select(&self, prompt: &str, items: &[String]) -> Result<Vec<usize>> {
        let picks = dialoguer::MultiSelect::new()
            .with_prompt(prompt)
            .items(items)
            .interact()
            .context("Failed to read selection")?;
        Ok(picks)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read user input")
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~").as_ref())
}

/// Resolve the scope the user asked for; user scope is the default
fn scope_paths(_user: bool, project: bool) -> Result<ScopePaths> {
    if project {
        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Ok(ScopePaths::project(&cwd))
    } else {
        Ok(ScopePaths::user(&home_dir()))
    }
}

fn parse_kind(kind: &Option<String>) -> Result<Option<ExtensionKind>> {
    kind.as_deref().map(ExtensionKind::from_str).transpose()
}

/// The project root feeding the detector's declaration tier: the current
/// directory when it carries a pacc.json
fn detect_project_root() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.join(pacc::constants::PROJECT_MANIFEST)
        .exists()
        .then_some(cwd)
}

fn installer_for(paths: ScopePaths, config: &PaccConfig) -> Installer {
    let store = SettingsStore::new(paths.settings_path(), config.lock.clone());
    Installer::new(paths, store)
}

/// A spinner for long resolutions, suppressed in JSON mode
fn progress_spinner(message: String, json: bool) -> Option<indicatif::ProgressBar> {
    if json {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

/// Record freshly installed extensions as specs in the project manifest
fn save_to_manifest(source: &str, installed: &[ExtensionRecord]) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut manifest = ProjectManifest::load(&cwd)
        .context("--save needs a pacc.json; run `pacc init --project-config` first")?;
    for record in installed {
        manifest.upsert_spec(
            record.kind,
            pacc::project::ExtensionSpec {
                name: record.name.clone(),
                source: source.to_string(),
                version: Some(record.version.clone()),
                r#ref: None,
                environment: None,
                dependencies: record.dependencies.clone(),
                target_dir: None,
                preserve_structure: None,
            },
        );
    }
    manifest.save(&cwd)
}

/// Drop a removed extension's spec from the project manifest, if present
fn remove_from_manifest(kind: ExtensionKind, name: &str) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let Ok(mut manifest) = ProjectManifest::load(&cwd) else {
        return Ok(());
    };
    if manifest.remove_spec(kind, name) {
        manifest.save(&cwd)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if cli.no_color {
        // Downstream rendering honors the conventional variable
        std::env::set_var("NO_COLOR", "1");
    }

    // An interrupt mid-operation leaves at most a stale lockfile, which the
    // next invocation takes over after the stale age.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });

    // clap exits with EXIT_USAGE on malformed command lines before we get here
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = PaccConfig::load()?;
    let verbose = cli.verbose;

    match cli.command {
        Commands::Install {
            source,
            user,
            project,
            kind,
            force,
            dry_run,
            interactive,
            all: _,
            strict,
            save,
            json,
        } => {
            let kind = parse_kind(&kind)?;
            let paths = scope_paths(user, project)?;
            let project_root = detect_project_root();

            let spinner = progress_spinner(format!("Resolving {source}"), json);
            let resolver = SourceResolver::new(config.clone());
            let staged = resolver
                .resolve(&source, kind, project_root.as_deref())
                .await;
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            let staged = staged?;

            let options = InstallOptions {
                force,
                dry_run,
                interactive,
                strict: strict || config.install.strict,
                kind_filter: kind,
                ..Default::default()
            };
            let installer = installer_for(paths, &config);
            let selector: Box<dyn Selector> = if interactive {
                Box::new(DialoguerSelector)
            } else {
                Box::new(SelectAll)
            };

            let outcome = installer.install(&staged, &options, selector.as_ref())?;

            if save && !outcome.dry_run {
                save_to_manifest(&source, &outcome.installed)?;
            }

            let verb = if outcome.dry_run { "would install" } else { "installed" };
            let mut report = CommandReport::ok(format!(
                "{verb} {} extension(s) into the {} scope",
                outcome.installed.len(),
                installer.scope_paths().scope
            ))
            .with_data(json!({
                "installed": outcome.installed,
                "skipped": outcome.skipped,
                "dry_run": outcome.dry_run,
            }));
            for skipped in &outcome.skipped {
                report.warn(skipped.clone());
            }
            Ok(report.emit(json, verbose))
        }

        Commands::Remove {
            name,
            user,
            project,
            kind,
            confirm,
            dry_run,
            force,
            save,
            json,
        } => {
            let kind = parse_kind(&kind)?;
            let paths = scope_paths(user, project)?;
            let installer = installer_for(paths, &config);

            if !confirm && !dry_run && !force {
                let selector = DialoguerSelector;
                if !selector.confirm(&format!("Remove {name:?}?")).unwrap_or(true) {
                    return Ok(CommandReport::failure("removal cancelled").emit(json, verbose));
                }
            }

            let options = RemoveOptions {
                force,
                dry_run,
                kind,
            };
            let outcome = installer.remove(&name, &options)?;

            if save && !outcome.dry_run {
                remove_from_manifest(outcome.record.kind, &outcome.record.name)?;
            }

            let verb = if outcome.dry_run { "would remove" } else { "removed" };
            let report = CommandReport::ok(format!(
                "{verb} {} {} ({})",
                outcome.record.kind,
                outcome.record.name,
                outcome.removed_file.display()
            ))
            .with_data(json!({ "record": outcome.record, "dry_run": outcome.dry_run }));
            Ok(report.emit(json, verbose))
        }

        Commands::List {
            kind,
            user,
            project,
            all,
            format,
            filter,
            search,
            sort,
            show_status,
        } => {
            let kind = kind
                .as_deref()
                .map(ExtensionKind::from_str)
                .transpose()?;

            let mut scopes = Vec::new();
            if all {
                scopes.push(scope_paths(true, false)?);
                scopes.push(scope_paths(false, true)?);
            } else {
                scopes.push(scope_paths(user, project)?);
            }

            let mut rows: Vec<(Scope, ExtensionRecord)> = Vec::new();
            for paths in scopes {
                let installer = installer_for(paths.clone(), &config);
                let doc = if show_status {
                    installer.refresh_statuses().await?
                } else {
                    installer.store().load()?
                };
                for k in ExtensionKind::ALL {
                    if kind.is_some() && kind != Some(k) {
                        continue;
                    }
                    for record in doc.records(k) {
                        rows.push((paths.scope, record.clone()));
                    }
                }
            }

            if let Some(pattern) = &filter {
                rows.retain(|(_, r)| pacc::utils::wildcard_match(pattern, &r.name));
            }
            if let Some(needle) = &search {
                let needle = needle.to_lowercase();
                rows.retain(|(_, r)| {
                    r.name.to_lowercase().contains(&needle)
                        || r.source.to_lowercase().contains(&needle)
                });
            }
            match sort.as_str() {
                "type" => rows.sort_by(|a, b| a.1.kind.cmp(&b.1.kind).then(a.1.name.cmp(&b.1.name))),
                "date" => rows.sort_by(|a, b| b.1.installed_at.cmp(&a.1.installed_at)),
                _ => rows.sort_by(|a, b| a.1.name.cmp(&b.1.name)),
            }

            render_list(&rows, &format, all);
            Ok(0)
        }

        Commands::Info {
            source,
            user,
            project,
            json,
            show_related,
            show_usage,
            show_troubleshooting,
        } => {
            let report = info_command(
                &config,
                &source,
                user,
                project,
                show_related,
                show_usage,
                show_troubleshooting,
            )
            .await?;
            Ok(report.emit(json, verbose))
        }

        Commands::Validate {
            source,
            kind,
            strict,
            json,
        } => {
            let report = validate_command(&config, &source, parse_kind(&kind)?, strict).await?;
            Ok(report.emit(json, verbose))
        }

        Commands::Init {
            project_config,
            name,
            version,
            description,
        } => {
            let cwd = std::env::current_dir()?;
            let paths = ScopePaths::project(&cwd);
            for kind in ExtensionKind::ALL {
                std::fs::create_dir_all(paths.kind_dir(kind))?;
            }

            let mut message = format!("initialized {}", paths.root.display());
            if project_config {
                let project_name = name.unwrap_or_else(|| {
                    cwd.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("project")
                        .to_string()
                });
                ProjectManifest::init(&cwd, &project_name, &version, description)?;
                message.push_str(" and wrote pacc.json");
            }
            Ok(CommandReport::ok(message).emit(false, verbose))
        }

        Commands::Sync {
            environment,
            dry_run,
            json,
        } => {
            let cwd = std::env::current_dir()?;
            let engine = SyncEngine::new(config.clone());
            let spinner = progress_spinner("Syncing project extensions".to_string(), json);
            let sync = engine.sync(&cwd, environment.as_deref(), dry_run).await;
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            let sync = sync?;

            let mut report = if sync.success() {
                CommandReport::ok(format!(
                    "synced: {} installed, {} up to date",
                    sync.installed_count(),
                    sync.results.len() - sync.installed_count()
                ))
            } else {
                CommandReport::failure("sync finished with failures")
            };
            let mut detail = Vec::new();
            for (name, status) in &sync.results {
                let status_str = match status {
                    SyncStatus::Installed => "installed".to_string(),
                    SyncStatus::Skipped => "skipped".to_string(),
                    SyncStatus::Failed(reason) => {
                        report.error(format!("{name}: {reason}"));
                        format!("failed: {reason}")
                    }
                };
                detail.push(json!({ "name": name, "status": status_str }));
            }
            report = report.with_data(json!({ "results": detail, "dry_run": dry_run }));
            Ok(report.emit(json, verbose))
        }

        Commands::Plugin { command } => plugin_command(command, &config, verbose).await,
    }
}

fn render_list(rows: &[(Scope, ExtensionRecord)], format: &str, show_scope: bool) {
    match format {
        "json" => {
            let items: Vec<serde_json::Value> = rows
                .iter()
                .map(|(scope, r)| {
                    let mut value = serde_json::to_value(r).unwrap_or_default();
                    value["scope"] = json!(scope.to_string());
                    value
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "extensions": items })).unwrap_or_default()
            );
        }
        "list" => {
            for (scope, record) in rows {
                if show_scope {
                    println!("{} {} ({}) [{}]", record.kind, record.name, record.version, scope);
                } else {
                    println!("{} {} ({})", record.kind, record.name, record.version);
                }
            }
        }
        _ => {
            if rows.is_empty() {
                println!("No extensions installed.");
                return;
            }
            println!(
                "{:<10} {:<24} {:<12} {:<10} {:<8}",
                "TYPE", "NAME", "VERSION", "STATUS", "SCOPE"
            );
            for (scope, record) in rows {
                println!(
                    "{:<10} {:<24} {:<12} {:<10} {:<8}",
                    record.kind.to_string(),
                    record.name,
                    record.version,
                    record.validation_status.to_string(),
                    scope.to_string()
                );
            }
        }
    }
}

async fn info_command(
    config: &PaccConfig,
    source: &str,
    user: bool,
    project: bool,
    show_related: bool,
    show_usage: bool,
    show_troubleshooting: bool,
) -> Result<CommandReport> {
    let as_path = PathBuf::from(shellexpand::tilde(source).as_ref());

    // A path on disk is validated in place; otherwise look up an installed
    // record by name.
    if as_path.exists() {
        let resolver = SourceResolver::new(config.clone());
        let staged = resolver
            .resolve(source, None, detect_project_root().as_deref())
            .await?;
        let mut data = Vec::new();
        for candidate in staged.candidates.iter().chain(staged.rejected.iter()) {
            let size = std::fs::metadata(&candidate.path).map(|m| m.len()).unwrap_or(0);
            data.push(json!({
                "file": candidate.path.display().to_string(),
                "type": candidate.kind.to_string(),
                "name": candidate.name,
                "version": candidate.version,
                "size_bytes": size,
                "valid": candidate.result.valid,
                "metadata": candidate.result.metadata,
                "errors": candidate.result.errors,
                "warnings": candidate.result.warnings,
            }));
        }
        return Ok(
            CommandReport::ok(format!("{} file(s) inspected", data.len()))
                .with_data(json!({ "files": data })),
        );
    }

    let paths = scope_paths(user, project)?;
    let installer = installer_for(paths, config);
    let doc = installer.store().load()?;
    let matches = doc.find_any_kind(source);
    let record = match matches.as_slice() {
        [] => bail!("no file or installed extension named {source:?}"),
        [record] => (*record).clone(),
        _ => bail!("{source:?} exists in multiple kinds; use list --filter to inspect"),
    };

    let mut lines = vec![format!(
        "{} {} v{} ({})",
        record.kind, record.name, record.version, record.validation_status
    )];
    lines.push(format!("  source: {}", record.source));
    lines.push(format!("  path: {}", record.path));
    lines.push(format!("  installed: {}", record.installed_at));

    if show_related {
        let related: Vec<&str> = doc
            .records(record.kind)
            .iter()
            .filter(|r| r.name != record.name)
            .map(|r| r.name.as_str())
            .collect();
        if !related.is_empty() {
            lines.push(format!("  related {}s: {}", record.kind, related.join(", ")));
        }
    }
    if show_usage {
        lines.push(format!("  usage: {}", usage_hint(record.kind, &record)));
    }
    if show_troubleshooting {
        lines.push(format!("  troubleshooting: {}", troubleshooting_hint(record.kind)));
    }

    Ok(CommandReport::ok(lines.join("\n")).with_data(serde_json::to_value(&record)?))
}

fn usage_hint(kind: ExtensionKind, record: &ExtensionRecord) -> String {
    match kind {
        ExtensionKind::Hook => match &record.events {
            Some(events) => format!("runs automatically on {}", events.join(", ")),
            None => "runs automatically on its configured events".to_string(),
        },
        ExtensionKind::Mcp => "served over MCP; restart the assistant to pick it up".to_string(),
        ExtensionKind::Agent => "invoke through the agent picker or mention it by name".to_string(),
        ExtensionKind::Command => match &record.aliases {
            Some(aliases) if !aliases.is_empty() => {
                format!("type /{} (aliases: {})", record.name, aliases.join(", "))
            }
            _ => format!("type /{}", record.name),
        },
    }
}

fn troubleshooting_hint(kind: ExtensionKind) -> String {
    match kind {
        ExtensionKind::Hook => {
            "check that its events match your workflow and the commands exist on PATH".to_string()
        }
        ExtensionKind::Mcp => {
            "run the server command by hand to confirm the executable and args".to_string()
        }
        ExtensionKind::Agent => "validate the frontmatter and confirm the model name".to_string(),
        ExtensionKind::Command => {
            "confirm the file has a /heading and shows up in list".to_string()
        }
    }
}

async fn validate_command(
    config: &PaccConfig,
    source: &str,
    kind: Option<ExtensionKind>,
    strict: bool,
) -> Result<CommandReport> {
    let as_path = PathBuf::from(shellexpand::tilde(source).as_ref());
    if !as_path.exists() {
        bail!("source not found: {source}");
    }

    // A project manifest validates against the manifest schema
    if as_path
        .file_name()
        .and_then(|n| n.to_str())
        == Some(pacc::constants::PROJECT_MANIFEST)
    {
        let root = as_path.parent().unwrap_or(std::path::Path::new("."));
        let manifest = ProjectManifest::load(root)?;
        let result = manifest.validate();
        return Ok(validation_report(source, &[("project", result)], strict));
    }

    // A directory holding a plugin.json validates as a plugin bundle
    if as_path.is_dir() && as_path.join("plugin.json").exists() {
        let (result, manifest) = PluginValidator::new().validate_dir(&as_path).await?;
        return Ok(validation_report(source, &[("plugin", result)], strict)
            .with_data(json!({ "manifest": manifest })));
    }

    if as_path.is_file() {
        let registry = ValidatorRegistry::new();
        let detected = kind.or_else(|| detector::detect(&as_path, detect_project_root().as_deref()));
        let Some(detected) = detected else {
            // A markdown file that is neither agent nor command may still be
            // a fragment; try that before giving up.
            let result = FragmentValidator::new().validate_file(&as_path).await?;
            return Ok(validation_report(source, &[("fragment", result)], strict));
        };
        let result = registry.get(detected).validate_file(&as_path).await?;
        return Ok(validation_report(
            source,
            &[(detected.as_str(), result)],
            strict,
        ));
    }

    // Plain directory: validate everything it contains
    let resolver = SourceResolver::new(config.clone());
    let staged = resolver.resolve(source, kind, None).await?;
    let mut results = Vec::new();
    for candidate in staged.candidates.iter().chain(staged.rejected.iter()) {
        results.push((candidate.kind.as_str(), candidate.result.clone()));
    }
    if results.is_empty() {
        bail!("no recognizable extensions in {source}");
    }
    Ok(validation_report(source, &results, strict))
}

fn validation_report(
    source: &str,
    results: &[(&str, pacc::models::ValidationResult)],
    strict: bool,
) -> CommandReport {
    let error_count: usize = results.iter().map(|(_, r)| r.errors.len()).sum();
    let warning_count: usize = results.iter().map(|(_, r)| r.warnings.len()).sum();
    let failed = error_count > 0 || (strict && warning_count > 0);

    let mut report = if failed {
        CommandReport::failure(format!(
            "{source}: {error_count} error(s), {warning_count} warning(s)"
        ))
    } else {
        CommandReport::ok(format!("{source}: valid ({warning_count} warning(s))"))
    };
    for (kind, result) in results {
        for issue in &result.errors {
            report.errors.push(format!("[{kind}] {}: {}", issue.code, issue.message));
        }
        for issue in &result.warnings {
            report.warnings.push(format!("[{kind}] {}: {}", issue.code, issue.message));
        }
    }
    if failed {
        report.success = false;
    }
    report
}

async fn plugin_command(
    command: PluginCommands,
    config: &PaccConfig,
    verbose: bool,
) -> Result<i32> {
    let paths = ScopePaths::user(&home_dir());
    let service = PluginService::new(paths, config);

    match command {
        PluginCommands::Install {
            url,
            plugin,
            all,
            enable,
            json,
        } => {
            let spinner = progress_spinner(format!("Cloning {url}"), json);
            let result = service.install(&url, plugin.as_deref(), all || enable).await;
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            let record = result?;
            let report = CommandReport::ok(format!(
                "installed {} at {} ({} plugin(s): {})",
                record.id(),
                &record.current_commit[..record.current_commit.len().min(8)],
                record.plugins.len(),
                record.plugins.join(", ")
            ))
            .with_data(serde_json::to_value(&record)?);
            Ok(report.emit(json, verbose))
        }

        PluginCommands::List {
            installed: _,
            available,
            kind,
            enabled,
            json,
        } => {
            if available {
                // Catalog view: entries whose repository is not yet tracked
                let search = PluginSearch::new()?;
                let settings = service.store().load()?;
                let hits = search.search("", &settings, &[]);
                let free: Vec<_> = hits.into_iter().filter(|h| !h.installed).collect();
                if json {
                    println!("{}", serde_json::to_string_pretty(&json!({ "available": free }))?);
                } else {
                    for hit in free {
                        println!("{:<20} {:<28} {}", hit.entry.name, hit.entry.repository, hit.entry.description);
                    }
                }
                return Ok(0);
            }

            let mut rows = service.list()?;
            if enabled {
                rows.retain(|r| r.enabled);
            }
            if let Some(kind) = parse_kind(&kind)? {
                // Keep only plugins that expose at least one component of the
                // requested kind.
                let mut keep = Vec::new();
                for row in rows {
                    if let Ok((_, plugin, _)) =
                        service.info(&format!("{}:{}", row.repository, row.name)).await
                    {
                        if plugin.components.contains_key(&kind) {
                            keep.push(row);
                        }
                    }
                }
                rows = keep;
            }
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "plugins": rows }))?
                );
            } else if rows.is_empty() {
                println!("No plugins installed.");
            } else {
                println!("{:<28} {:<24} {:<10} {:<10}", "REPOSITORY", "PLUGIN", "COMMIT", "ENABLED");
                for row in rows {
                    println!(
                        "{:<28} {:<24} {:<10} {:<10}",
                        row.repository,
                        row.name,
                        row.commit,
                        if row.enabled { "yes" } else { "no" }
                    );
                }
            }
            Ok(0)
        }

        PluginCommands::Enable { id } => {
            let (repo, plugin) = parse_plugin_id(&id)?;
            service.enable(&repo, &plugin)?;
            Ok(CommandReport::ok(format!("enabled {repo}:{plugin}")).emit(false, verbose))
        }

        PluginCommands::Disable { id } => {
            let (repo, plugin) = parse_plugin_id(&id)?;
            service.disable(&repo, &plugin)?;
            Ok(CommandReport::ok(format!("disabled {repo}:{plugin}")).emit(false, verbose))
        }

        PluginCommands::Update {
            url,
            check,
            all: _,
            force,
            json,
        } => {
            let outcomes = service.update(url.as_deref(), check, force).await?;
            let mut report = CommandReport::ok("update complete");
            let mut detail = Vec::new();
            for (repo, status) in &outcomes {
                let line = match status {
                    UpdateStatus::UpToDate => format!("{repo}: up to date"),
                    UpdateStatus::UpdateAvailable => format!("{repo}: update available"),
                    UpdateStatus::Updated { old, new } => {
                        format!("{repo}: {} -> {}", &old[..old.len().min(8)], &new[..new.len().min(8)])
                    }
                    UpdateStatus::Failed(err) => {
                        report.error(format!("{repo}: {err}"));
                        format!("{repo}: failed")
                    }
                };
                detail.push(line);
            }
            report.message = detail.join("; ");
            Ok(report.emit(json, verbose))
        }

        PluginCommands::Remove { name } => {
            let removed = service.remove(&name).await?;
            Ok(CommandReport::ok(format!("removed {}", removed.join(", "))).emit(false, verbose))
        }

        PluginCommands::Info {
            name,
            repository,
            json,
        } => {
            if repository {
                let settings = service.store().load()?;
                let record = settings
                    .repo_record(&name)
                    .with_context(|| format!("repository {name:?} is not installed"))?;
                let report = CommandReport::ok(format!(
                    "{} at {} ({} plugin(s): {})",
                    record.id(),
                    &record.current_commit[..record.current_commit.len().min(8)],
                    record.plugins.len(),
                    record.plugins.join(", ")
                ))
                .with_data(serde_json::to_value(&record)?);
                return Ok(report.emit(json, verbose));
            }
            let (record, plugin, enabled) = service.info(&name).await?;
            let components: Vec<String> = plugin
                .components
                .iter()
                .map(|(kind, count)| format!("{count} {kind}(s)"))
                .collect();
            let report = CommandReport::ok(format!(
                "{} v{} from {} ({}): {}",
                plugin.manifest.name,
                plugin.manifest.version,
                record.id(),
                if enabled { "enabled" } else { "disabled" },
                if components.is_empty() {
                    "no components".to_string()
                } else {
                    components.join(", ")
                }
            ))
            .with_data(json!({
                "repository": record,
                "manifest": plugin.manifest,
                "components": components,
                "enabled": enabled,
            }));
            Ok(report.emit(json, verbose))
        }

        PluginCommands::Search { query, json } => {
            let search = PluginSearch::new()?;
            let settings = service.store().load()?;
            let cwd = std::env::current_dir()?;
            let languages = PluginSearch::project_languages(&cwd);
            let hits = search.search(&query, &settings, &languages);

            if json {
                println!("{}", serde_json::to_string_pretty(&json!({ "hits": hits }))?);
            } else if hits.is_empty() {
                println!("No plugins match {query:?}.");
            } else {
                for hit in hits {
                    let mark = if hit.installed { "*" } else { " " };
                    println!(
                        "{mark} {:<20} {:<28} {}",
                        hit.entry.name, hit.entry.repository, hit.entry.description
                    );
                }
            }
            Ok(0)
        }

        PluginCommands::Sync {
            url,
            check,
            force,
            json,
        } => {
            let outcomes = service.sync_repos(url.as_deref(), check, force).await?;
            let mut report = CommandReport::ok("plugin repositories in sync");
            let mut lines = Vec::new();
            for (repo, status) in &outcomes {
                match status {
                    UpdateStatus::UpToDate => lines.push(format!("{repo}: pinned")),
                    UpdateStatus::UpdateAvailable => lines.push(format!("{repo}: drifted")),
                    UpdateStatus::Updated { new, .. } => {
                        lines.push(format!("{repo}: reset to {}", &new[..new.len().min(8)]))
                    }
                    UpdateStatus::Failed(err) => report.error(format!("{repo}: {err}")),
                }
            }
            if !lines.is_empty() {
                report.message = lines.join("; ");
            }
            Ok(report.emit(json, verbose))
        }

        PluginCommands::Env { command } => {
            let manager = EnvManager::new(home_dir());
            match command {
                EnvCommands::Status { json } => {
                    let status = manager.status();
                    let report = CommandReport::ok(format!(
                        "platform={:?} shell={} {}={} container={}",
                        status.platform,
                        status.shell,
                        pacc::constants::ENABLE_PLUGINS_VAR,
                        status.enable_plugins_value.as_deref().unwrap_or("(unset)"),
                        status.containerized
                    ))
                    .with_data(serde_json::to_value(&status)?);
                    Ok(report.emit(json, verbose))
                }
                EnvCommands::Setup => {
                    let shell = EnvManager::detect_shell();
                    let outcome = manager.setup(shell)?;
                    let message = if outcome.changed {
                        format!(
                            "wrote plugin export to {}; restart your shell",
                            outcome.profile.display()
                        )
                    } else {
                        format!("{} already configured", outcome.profile.display())
                    };
                    Ok(CommandReport::ok(message).emit(false, verbose))
                }
                EnvCommands::Verify { json } => {
                    let verify = manager.verify();
                    let report = if verify.ok {
                        CommandReport::ok(verify.detail.clone())
                    } else {
                        CommandReport::failure(verify.detail.clone())
                    }
                    .with_data(serde_json::to_value(&verify)?);
                    Ok(report.emit(json, verbose))
                }
                EnvCommands::Reset => {
                    let shell = EnvManager::detect_shell();
                    let outcome = manager.reset(shell)?;
                    let message = if outcome.changed {
                        format!("restored {}", outcome.profile.display())
                    } else {
                        format!("{} had no PACC block", outcome.profile.display())
                    };
                    Ok(CommandReport::ok(message).emit(false, verbose))
                }
            }
        }
    }
}
