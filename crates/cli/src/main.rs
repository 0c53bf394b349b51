//! viewsync command-line tool.
//!
//! Drives a workspace against the configured repository view: checkin,
//! checkout, locking, adding and restructuring folders and files, file
//! history, plus configuration, store creation, the audit log and pending
//! local changes.

mod style;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use viewsync_core::config::{AppConfig, LoggingConfig};
use viewsync_core::db::Database;
use viewsync_core::errors::VcsError;
use viewsync_core::models::{AuditEntry, ItemId, ItemStatus};
use viewsync_core::transaction::{AlwaysConfirm, CheckoutPrompt};
use viewsync_core::{MemoryRepository, PendingChanges, Workspace, WorkspaceSettings};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// viewsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "viewsync",
    version,
    about = "Keep a local working tree in sync with a repository view"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to ./viewsync.toml,
    /// then the user config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./viewsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Manage repository stores for the bundled session.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Show the status of a working file.
    Status { path: String },

    /// Check in a working file.
    Checkin {
        path: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Check out a file over its working copy.
    Checkout {
        path: String,
        /// Overwrite local changes without asking.
        #[arg(short, long)]
        yes: bool,
    },

    /// Check out every file under a folder.
    CheckoutFolder { path: String },

    /// Lock a file.
    Lock { path: String },

    /// Unlock a file.
    Unlock { path: String },

    /// Put a local file under version control.
    Add {
        /// Folder holding the file.
        folder: String,
        /// File name within the folder.
        name: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Create a folder in the repository.
    Mkdir { parent: String, name: String },

    /// Rename a folder whose working directory was renamed.
    RenameDir {
        path: String,
        new_name: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Move a folder whose working directory was moved.
    MoveDir {
        path: String,
        new_parent: String,
        /// New name; defaults to the current one.
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Move a file whose working copy was moved, and check it in.
    MoveFile {
        path: String,
        new_parent: String,
        /// New name; defaults to the current one.
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Rename a file whose working copy was renamed, and check it in.
    RenameFile {
        path: String,
        new_name: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Print the content of a file, or of one of its revisions.
    Cat {
        path: String,
        #[arg(short, long)]
        revision: Option<u32>,
    },

    /// Show the revision history of a file.
    History { path: String },

    /// Show recent audit log entries.
    Audit {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Inspect or change the recorded local changes.
    Pending {
        #[command(subcommand)]
        action: PendingAction,
    },
}

#[derive(Subcommand, Debug)]
enum StoreAction {
    /// Create a store holding one project view rooted at a local directory.
    Create {
        /// Path of the store file to write.
        path: PathBuf,
        #[arg(long)]
        project: String,
        #[arg(long)]
        view: String,
        /// Working directory the view root maps to.
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        user: String,
        /// Environment variable holding the user's password.
        #[arg(long)]
        password_env: Option<String>,
        /// Seed the view with the files already under the root.
        #[arg(long)]
        import: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PendingAction {
    /// List recorded changes.
    Show,
    /// Forget every recorded change.
    Clear,
    /// Record a locally created file.
    New { path: String },
    /// Record a locally renamed file or directory.
    Renamed {
        old: String,
        new: String,
        #[arg(long)]
        dir: bool,
    },
    /// Move a deleted managed directory aside and record it as removed.
    Stash { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = config_path(cli.config.as_deref());
    match cli.command {
        Commands::Init { output } => {
            let _guard = init_logging(&LoggingConfig::default());
            cmd_init(&output)
        }
        Commands::Validate => {
            let _guard = init_logging(&LoggingConfig::default());
            cmd_validate(&config_path)
        }
        Commands::Store { action } => {
            let _guard = init_logging(&LoggingConfig::default());
            cmd_store(action)
        }
        command => {
            let config = load_config(&config_path)?;
            let _guard = init_logging(&config.logging);
            let db = open_database(&config)?;

            match command {
                Commands::Audit { limit } => cmd_audit(&db, limit),
                Commands::Pending { action } => cmd_pending(&db, action),
                command => {
                    let yes = matches!(command, Commands::Checkout { yes: true, .. });
                    let mut app = App::open(&config, db, yes)?;
                    let result = app.dispatch(command);
                    app.finish()?;
                    result
                }
            }
        }
    }
}

/// Configure tracing from `[logging]`. `RUST_LOG` overrides the level.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file = logging.file.as_ref().and_then(|file| {
        let name = file.file_name()?.to_os_string();
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Some((dir, name))
    });

    match file {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from("./viewsync.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("viewsync").join("config.toml"))
        .unwrap_or(local)
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn open_database(config: &AppConfig) -> Result<Database> {
    Database::open_workspace(&config.workspace.data_dir).context("failed to open state database")
}

/// Absolute form of a command-line path, with `/` separators.
fn absolute(path: &str) -> Result<String> {
    let path = Path::new(path);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot read the current directory")?
            .join(path)
    };
    Ok(path
        .to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_string())
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ---------------------------------------------------------------------------
// Interactive prompt
// ---------------------------------------------------------------------------

struct ConfirmPrompt;

impl CheckoutPrompt for ConfirmPrompt {
    fn confirm_overwrite(&self, path: &str, status: ItemStatus) -> bool {
        Confirm::new()
            .with_prompt(format!("{path} is {status}. Overwrite the local copy?"))
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Workspace-backed commands
// ---------------------------------------------------------------------------

struct App {
    ws: Workspace<MemoryRepository>,
    db: Database,
    pending: Arc<PendingChanges>,
}

impl App {
    fn open(config: &AppConfig, db: Database, yes: bool) -> Result<Self> {
        let mut repo = MemoryRepository::open(&config.server.store)
            .context("failed to open repository store")?;
        repo.log_on(&config.server.user, config.server.password.as_deref())
            .context("failed to log on")?;

        let agent = &config.server.cache_agent;
        if agent.enabled {
            info!(
                host = %agent.host,
                port = agent.port,
                "cache agent configured; the bundled store reads content directly"
            );
        }

        let pending = Arc::new(PendingChanges::new());
        db.restore_pending(&pending)
            .context("failed to load pending changes")?;

        let prompt: Box<dyn CheckoutPrompt> = if yes {
            Box::new(AlwaysConfirm)
        } else {
            Box::new(ConfirmPrompt)
        };
        let ws = Workspace::open(repo, WorkspaceSettings::from_config(&config.workspace))
            .context("failed to open workspace")?
            .with_prompt(prompt)
            .with_pending(Arc::clone(&pending));

        Ok(Self { ws, db, pending })
    }

    /// Persist the store and the pending changes.
    fn finish(&self) -> Result<()> {
        self.ws
            .session()
            .save()
            .context("failed to save repository store")?;
        self.db
            .persist_pending(&self.pending)
            .context("failed to save pending changes")?;
        Ok(())
    }

    /// Run a workspace operation and record its outcome in the audit log.
    fn audited<T>(
        &mut self,
        action: &str,
        path: &str,
        op: impl FnOnce(&mut Workspace<MemoryRepository>) -> Result<T, VcsError>,
    ) -> Result<T> {
        let result = op(&mut self.ws);
        let entry = match &result {
            Ok(_) => AuditEntry::success(action, Some(path), "ok"),
            Err(e) => AuditEntry::failure(action, Some(path), &e.to_string()),
        };
        self.db.record_audit(&entry);
        result.with_context(|| format!("{action} failed for {path}"))
    }

    fn record_refusal(&self, action: &str, path: &str, details: &str) {
        self.db
            .record_audit(&AuditEntry::failure(action, Some(path), details));
    }

    fn dispatch(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Status { path } => self.cmd_status(&absolute(&path)?),
            Commands::Checkin { path, message } => {
                let path = absolute(&path)?;
                let done = self.audited("checkin", &path, |ws| ws.checkin_file(&path, &message))?;
                if !done {
                    self.record_refusal("checkin", &path, "refused: merge needed or server copy is newer");
                    anyhow::bail!(
                        "checkin of {} refused: the repository holds a newer version; check out or merge first",
                        path
                    );
                }
                println!("{}", style::success(&format!("checked in {}", path)));
                Ok(())
            }
            Commands::Checkout { path, .. } => {
                let path = absolute(&path)?;
                let done = self.audited("checkout", &path, |ws| ws.checkout_file(&path, true))?;
                if done {
                    println!("{}", style::success(&format!("checked out {}", path)));
                } else {
                    println!("{}", style::warn(&format!("{} was left untouched", path)));
                }
                Ok(())
            }
            Commands::CheckoutFolder { path } => {
                let path = absolute(&path)?;
                self.audited("checkout_folder", &path, |ws| ws.checkout_folder_path(&path))?;
                println!("{}", style::success(&format!("checked out {}", path)));
                Ok(())
            }
            Commands::Lock { path } => {
                let path = absolute(&path)?;
                self.audited("lock", &path, |ws| ws.lock_file(&path))?;
                println!("{}", style::success(&format!("locked {}", path)));
                Ok(())
            }
            Commands::Unlock { path } => {
                let path = absolute(&path)?;
                self.audited("unlock", &path, |ws| ws.unlock_file(&path))?;
                println!("{}", style::success(&format!("unlocked {}", path)));
                Ok(())
            }
            Commands::Add {
                folder,
                name,
                message,
            } => {
                let folder = absolute(&folder)?;
                let target = format!("{folder}/{name}");
                self.audited("add", &target, |ws| ws.add_file(&folder, &name, &message))?;
                println!("{}", style::success(&format!("added {}", target)));
                Ok(())
            }
            Commands::Mkdir { parent, name } => {
                let parent = absolute(&parent)?;
                let target = format!("{parent}/{name}");
                self.audited("mkdir", &target, |ws| ws.add_directory(&parent, &name))?;
                println!("{}", style::success(&format!("created {}", target)));
                Ok(())
            }
            Commands::RenameDir {
                path,
                new_name,
                message,
            } => {
                let path = absolute(&path)?;
                self.audited("rename_dir", &path, |ws| {
                    ws.rename_directory(&path, &new_name, &message)
                })?;
                println!("{}", style::success(&format!("renamed {} to {}", path, new_name)));
                Ok(())
            }
            Commands::MoveDir {
                path,
                new_parent,
                name,
                message,
            } => {
                let path = absolute(&path)?;
                let new_parent = absolute(&new_parent)?;
                let name = name.unwrap_or_else(|| file_name(&path).to_string());
                self.audited("move_dir", &path, |ws| {
                    ws.move_and_rename_directory(&path, &new_parent, &name, &message)
                })?;
                println!(
                    "{}",
                    style::success(&format!("moved {} to {}/{}", path, new_parent, name))
                );
                Ok(())
            }
            Commands::MoveFile {
                path,
                new_parent,
                name,
                message,
            } => {
                let path = absolute(&path)?;
                let new_parent = absolute(&new_parent)?;
                let name = name.unwrap_or_else(|| file_name(&path).to_string());
                self.audited("move_file", &path, |ws| {
                    ws.move_rename_and_checkin_file(&path, &new_parent, &name, &message)
                })?;
                println!(
                    "{}",
                    style::success(&format!("moved {} to {}/{}", path, new_parent, name))
                );
                Ok(())
            }
            Commands::RenameFile {
                path,
                new_name,
                message,
            } => {
                let path = absolute(&path)?;
                self.audited("rename_file", &path, |ws| {
                    ws.rename_and_checkin_file(&path, &new_name, &message)
                })?;
                println!("{}", style::success(&format!("renamed {} to {}", path, new_name)));
                Ok(())
            }
            Commands::Cat { path, revision } => self.cmd_cat(&absolute(&path)?, revision),
            Commands::History { path } => self.cmd_history(&absolute(&path)?),
            Commands::Init { .. }
            | Commands::Validate
            | Commands::Store { .. }
            | Commands::Audit { .. }
            | Commands::Pending { .. } => {
                anyhow::bail!("command does not operate on a workspace")
            }
        }
    }

    fn cmd_status(&mut self, path: &str) -> Result<()> {
        let status = self
            .ws
            .update_status(path)
            .with_context(|| format!("cannot read status of {}", path))?;
        let file = self.ws.get_file(path)?;
        let node = self.ws.tree().file(file);

        println!("{}", style::header(path));
        println!("  Status   : {}", style::status(status));
        println!("  Version  : {}", node.content_version);
        println!("  Modified : {}", node.modified_at.format("%Y-%m-%d %H:%M:%S"));
        println!("  Lock     : {}", style::lock(node.lock));
        if !node.comment.is_empty() {
            println!("  Comment  : {}", node.comment);
        }
        if self.pending.contains_new(path) {
            println!("  {}", style::warn("recorded as a new local file"));
        }
        Ok(())
    }

    fn cmd_cat(&mut self, path: &str, revision: Option<u32>) -> Result<()> {
        let bytes = match revision {
            None => self
                .ws
                .get_file_content(path)
                .with_context(|| format!("cannot read {}", path))?,
            Some(number) => {
                let mut revisions = self.ws.list_revisions(path)?;
                let revision = revisions
                    .iter_mut()
                    .find(|r| r.number() == number)
                    .ok_or_else(|| anyhow::anyhow!("{} has no revision {}", path, number))?;
                self.ws.load_content(revision)?
            }
        };
        std::io::stdout()
            .write_all(&bytes)
            .context("failed to write to stdout")?;
        Ok(())
    }

    fn cmd_history(&mut self, path: &str) -> Result<()> {
        let revisions = self
            .ws
            .list_revisions(path)
            .with_context(|| format!("cannot list history of {}", path))?;

        if revisions.is_empty() {
            println!("No revisions found.");
            return Ok(());
        }

        println!();
        println!("{}", style::header(&format!("History of {}", path)));
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Rev", "Version", "Author", "Date", "Branch", "Comment"]);

        for revision in revisions.iter().rev() {
            table.add_row(vec![
                Cell::new(revision.number()),
                Cell::new(revision.content_version),
                Cell::new(&revision.author),
                Cell::new(revision.timestamp.format("%Y-%m-%d %H:%M")),
                Cell::new(&revision.branch),
                Cell::new(&revision.comment),
            ]);
        }

        println!("{}", table);
        println!();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Standalone commands
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!("{}", style::warn("Init cancelled. Existing file was not modified."));
            return Ok(());
        }
    }

    std::fs::write(output, AppConfig::sample()).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Create a store: viewsync store create <store.json> --project .. --view .. --root .. --user ..");
    println!("  2. Point [server] store, project and view at it");
    println!("  3. Validate with: viewsync validate --config {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    if let Err(e) = config.resolve_env_vars() {
        println!("  [FAIL] Environment variable error: {}", e);
        anyhow::bail!("configuration validation failed");
    }
    let unresolved = config.unresolved_env_vars();
    if unresolved.is_empty() {
        println!("  [OK] Environment variable references resolved");
    }
    for (field, var) in unresolved {
        println!("  [WARN] {} names ${}, which is not set", field, var);
    }

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Store          : {}", config.server.store.display());
    println!("  User           : {}", config.server.user);
    println!(
        "  Password       : {}",
        if config.server.password.is_some() { "set" } else { "not set" }
    );
    println!("  Project / view : {} / {}", config.workspace.project, config.workspace.view);
    println!(
        "  Overlay        : {}",
        config.workspace.alternate_working_path.as_deref().unwrap_or("none")
    );
    println!(
        "  Case matching  : {}",
        if config.workspace.case_sensitive() { "sensitive" } else { "insensitive" }
    );
    println!("  Data directory : {}", config.workspace.data_dir.display());
    println!();
    println!("Configuration is valid.");
    Ok(())
}

fn cmd_store(action: StoreAction) -> Result<()> {
    match action {
        StoreAction::Create {
            path,
            project,
            view,
            root,
            user,
            password_env,
            import,
        } => {
            if path.exists() {
                anyhow::bail!("store already exists: {}", path.display());
            }
            let password = match password_env {
                Some(var) => Some(
                    std::env::var(&var)
                        .with_context(|| format!("environment variable {} is not set", var))?,
                ),
                None => None,
            };
            let root = std::fs::canonicalize(&root)
                .with_context(|| format!("working root {} does not exist", root.display()))?;

            let mut repo = MemoryRepository::default();
            repo.add_user(&user, password.as_deref());
            repo.log_on(&user, password.as_deref())
                .context("failed to log on to the new store")?;
            let root_id = repo.create_view(&project, &view, &root);
            let imported = if import {
                import_tree(&mut repo, root_id, &root)?
            } else {
                0
            };
            repo.save_to(&path).context("failed to write store")?;

            println!(
                "{}",
                style::success(&format!(
                    "store {} created with view {}/{} ({} file(s) imported)",
                    path.display(),
                    project,
                    view,
                    imported
                ))
            );
            Ok(())
        }
    }
}

/// Seed `folder` with the content of `dir`. Hidden entries are skipped.
fn import_tree(repo: &mut MemoryRepository, folder: ItemId, dir: &Path) -> Result<usize> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("cannot list {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut count = 0;
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            let sub = repo.seed_folder(folder, &name);
            count += import_tree(repo, sub, &path)?;
        } else if path.is_file() {
            let content =
                std::fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
            let file = repo.seed_file(folder, &name, &content, "initial import");
            repo.mark_working_copy(file);
            count += 1;
        }
    }
    Ok(count)
}

fn cmd_audit(db: &Database, limit: u32) -> Result<()> {
    let entries = db
        .list_audit_log(limit)
        .context("failed to list audit entries")?;

    if entries.is_empty() {
        println!("No audit log entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Action", "Path", "Result", "Details"]);

    for entry in &entries {
        let result = if entry.success {
            Cell::new("✓ ok").fg(comfy_table::Color::Green)
        } else {
            Cell::new("✗ failed").fg(comfy_table::Color::Red)
        };
        table.add_row(vec![
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&entry.action),
            Cell::new(entry.path.as_deref().unwrap_or("-")),
            result,
            Cell::new(truncate(entry.details.as_deref().unwrap_or(""), 60)),
        ]);
    }

    println!("{}", table);
    println!(
        "{}",
        style::dim(&format!(
            "{} of {} entries shown, {} failure(s) in total",
            entries.len(),
            db.count_audit_log()?,
            db.count_failures()?
        ))
    );
    Ok(())
}

fn cmd_pending(db: &Database, action: PendingAction) -> Result<()> {
    let pending = PendingChanges::new();
    db.restore_pending(&pending)
        .context("failed to load pending changes")?;

    match action {
        PendingAction::Show => {
            let snapshot = pending.snapshot();
            if snapshot.is_empty() {
                println!("No pending changes.");
                return Ok(());
            }
            print_section("New files", snapshot.new_files.values().cloned());
            print_section("Removed files", snapshot.removed_files.iter().cloned());
            print_section("Removed folders", snapshot.removed_folders.iter().cloned());
            print_section(
                "Renamed files",
                snapshot.renamed_files.iter().map(|(new, old)| format!("{old} -> {new}")),
            );
            print_section(
                "Renamed folders",
                snapshot.renamed_dirs.iter().map(|(new, old)| format!("{old} -> {new}")),
            );
            return Ok(());
        }
        PendingAction::Clear => {
            pending.clear();
            println!("{}", style::success("pending changes cleared"));
        }
        PendingAction::New { path } => pending.add_new_file(&absolute(&path)?),
        PendingAction::Renamed { old, new, dir } => {
            let (old, new) = (absolute(&old)?, absolute(&new)?);
            if dir {
                pending.mark_renamed_dir(&old, &new);
            } else {
                pending.mark_renamed_file(&old, &new);
            }
        }
        PendingAction::Stash { path } => {
            let stash = pending
                .stash_removed_folder(&path)
                .with_context(|| format!("cannot stash {}", path.display()))?;
            println!(
                "{}",
                style::success(&format!("{} kept at {}", path.display(), stash.display()))
            );
        }
    }

    db.persist_pending(&pending)
        .context("failed to save pending changes")?;
    Ok(())
}

fn print_section(title: &str, items: impl Iterator<Item = String>) {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        return;
    }
    println!("{}", style::header(title));
    for item in items {
        println!("  {}", item);
    }
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer message", 10), "a longe...");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/w/proj/src"), "src");
        assert_eq!(file_name("plain"), "plain");
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().replace('\\', "/");
        assert_eq!(absolute(&format!("{path}/")).unwrap(), path);
    }

    #[test]
    fn test_import_tree_skips_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::create_dir_all(dir.path().join(".viewsync")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("src/nested/b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join(".viewsync/state"), b"x").unwrap();

        let mut repo = MemoryRepository::new("alice");
        let root = repo.create_view("proj", "main", dir.path());
        assert_eq!(import_tree(&mut repo, root, dir.path()).unwrap(), 2);
    }

    #[test]
    fn test_validate_tolerates_unset_password_variable() {
        std::env::remove_var("VIEWSYNC_CLI_TEST_PW");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewsync.toml");
        let body = r#"
[server]
store = "repo.json"
user = "alice"
password_env = "VIEWSYNC_CLI_TEST_PW"
[workspace]
project = "proj"
view = "main"
"#;
        std::fs::write(&path, body).unwrap();
        assert!(cmd_validate(&path).is_ok());

        std::fs::write(&path, body.replace("view = \"main\"", "view = \"\"")).unwrap();
        assert!(cmd_validate(&path).is_err());
    }

    #[test]
    fn test_cli_parses_checkout_flags() {
        let cli = Cli::try_parse_from(["viewsync", "checkout", "a.txt", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Checkout { yes: true, .. }));
        let cli = Cli::try_parse_from(["viewsync", "-c", "x.toml", "history", "a.txt"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
