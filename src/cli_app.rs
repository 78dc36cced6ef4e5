//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use paste_store::core::config::Config;
use paste_store::core::errors::PasteError;
use paste_store::daemon::loop_main::PasteDaemon;
use paste_store::logger::jsonl::Severity;
use paste_store::storage::id_pool::{is_valid_id, total_ids};
use paste_store::storage::inventory::{DirInventory, scan_backing_dir};
use paste_store::storage::lock::InstanceLock;

/// pastes: write over raw TCP, read back over HTTP.
#[derive(Debug, Parser)]
#[command(
    name = "pastes",
    author,
    version,
    about = "Tiny netcat-friendly paste service",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the paste service until SIGINT/SIGTERM.
    Serve(ServeArgs),
    /// Summarize the backing directory.
    Status,
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completion scripts.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ServeArgs {
    /// Address both listeners bind to.
    #[arg(long)]
    address: Option<String>,
    /// Port of the raw TCP write transport.
    #[arg(long, value_name = "PORT")]
    tcp_port: Option<u16>,
    /// Port of the HTTP read transport.
    #[arg(long, value_name = "PORT")]
    web_port: Option<u16>,
    /// Public base URL handed back to writers.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    /// Directory holding stored items.
    #[arg(long, value_name = "DIR")]
    directory: Option<PathBuf>,
    /// Maximum total size of the directory in bytes.
    #[arg(long, value_name = "BYTES")]
    max_dir_size: Option<u64>,
    /// Maximum size of one item in bytes.
    #[arg(long, value_name = "BYTES")]
    max_item_size: Option<u64>,
    /// Read deadline for one write connection, in milliseconds.
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
    /// Identifier length.
    #[arg(long, value_name = "N")]
    id_length: Option<usize>,
    /// Evict the oldest items when storage or identifiers run out.
    #[arg(long)]
    gc: bool,
    /// Minimum severity written to the activity log.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<Severity>,
}

impl ServeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.server.address.clone_from(address);
        }
        if let Some(port) = self.tcp_port {
            config.server.tcp_port = port;
        }
        if let Some(port) = self.web_port {
            config.server.web_port = port;
        }
        if let Some(url) = &self.base_url {
            config.server.base_url.clone_from(url);
        }
        if let Some(dir) = &self.directory {
            config.storage.directory.clone_from(dir);
        }
        if let Some(size) = self.max_dir_size {
            config.storage.max_dir_size = size;
        }
        if let Some(size) = self.max_item_size {
            config.storage.max_item_size = size;
        }
        if let Some(ms) = self.timeout_ms {
            config.ingest.timeout_ms = ms;
        }
        if let Some(len) = self.id_length {
            config.storage.id_length = len;
        }
        if self.gc {
            config.storage.gc = true;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl From<PasteError> for CliError {
    fn from(err: PasteError) -> Self {
        match err {
            PasteError::InvalidConfig { .. }
            | PasteError::MissingConfig { .. }
            | PasteError::ConfigParse { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Serve(args) => run_serve(cli, args),
        Command::Status => run_status(cli),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── serve ────────────────────

fn run_serve(cli: &Cli, args: &ServeArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    args.apply(&mut config);
    config.finalize()?;

    let mut daemon = PasteDaemon::init(config)?;
    daemon.run()?;
    Ok(())
}

// ──────────────────── status ────────────────────

fn run_status(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let dir = &config.storage.directory;
    let inventory = if dir.exists() {
        scan_backing_dir(dir)?
    } else {
        DirInventory::default()
    };

    let id_length = config.storage.id_length;
    let ids_in_use = inventory
        .used
        .iter()
        .filter(|name| is_valid_id(name, id_length))
        .count();
    let free_ids = total_ids(id_length).saturating_sub(ids_in_use);
    let max = config.storage.max_dir_size;
    #[allow(clippy::cast_precision_loss)]
    let utilization = if max == 0 {
        100.0
    } else {
        inventory.total_bytes as f64 / max as f64 * 100.0
    };
    let oldest_age_secs = inventory.oldest.as_ref().map(|item| {
        SystemTime::now()
            .duration_since(item.modified)
            .map_or(0, |age| age.as_secs())
    });
    let running = service_running(&config);

    match output_mode(cli) {
        OutputMode::Human => {
            println!("pastes v{}", env!("CARGO_PKG_VERSION"));
            println!("  Config:    {}", config.paths.config_file.display());
            println!(
                "  Service:   {}",
                if running {
                    "running".green()
                } else {
                    "not running".yellow()
                }
            );
            println!("  Directory: {}", dir.display());
            println!("  Items:     {}", inventory.item_count());
            println!(
                "  Size:      {} / {} ({})",
                format_bytes(inventory.total_bytes),
                format_bytes(max),
                utilization_label(utilization)
            );
            println!("  Free IDs:  {free_ids} of {}", total_ids(id_length));
            println!(
                "  GC:        {}",
                if config.storage.gc { "enabled" } else { "disabled" }
            );
            if let (Some(item), Some(age)) = (&inventory.oldest, oldest_age_secs) {
                println!("  Oldest:    {} ({} ago)", item.name, format_age(age));
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "status",
                "version": env!("CARGO_PKG_VERSION"),
                "running": running,
                "directory": dir.to_string_lossy(),
                "items": inventory.item_count(),
                "bytes": inventory.total_bytes,
                "max_bytes": max,
                "utilization_pct": utilization,
                "free_ids": free_ids,
                "gc": config.storage.gc,
                "oldest": inventory.oldest.as_ref().map(|item| json!({
                    "id": item.name,
                    "size": item.size,
                    "age_secs": oldest_age_secs,
                })),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

/// A held instance lock means a service owns the directory.
fn service_running(config: &Config) -> bool {
    if !config.paths.lock_file.exists() {
        return false;
    }
    matches!(
        InstanceLock::acquire(&config.paths.lock_file),
        Err(PasteError::InstanceLocked { .. })
    )
}

fn utilization_label(pct: f64) -> String {
    let label = format!("{pct:.1}%");
    if pct >= 100.0 {
        label.red().bold().to_string()
    } else if pct >= 80.0 {
        label.yellow().to_string()
    } else {
        label.green().to_string()
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config).map_err(PasteError::from)?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    let payload = json!({
                        "command": "config show",
                        "config": value,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("{}", "Configuration is valid.".green());
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("{} {e}", "Configuration is INVALID:".red().bold());
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                            "code": e.code(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output helpers ────────────────────

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn format_age(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("PASTES_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
