//! `ctd-proc`: process, approve and inspect CTD casts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ctd_core::config::ConfigManager;
use ctd_core::logging::{init_tracing, LogLevel, WorkerGuard};
use directories::ProjectDirs;

mod commands;
mod prompt;

/// Default config file name, looked up in the working directory first.
const CONFIG_FILE: &str = "config.toml";

/// CTD cast processing pipeline
#[derive(Parser, Debug)]
#[command(name = "ctd-proc", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./config.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the config file (RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process raw casts into the processing directory.
    Process {
        /// Base names of the casts to process
        casts: Vec<String>,

        /// Process every raw cast
        #[arg(long, conflicts_with = "casts")]
        all: bool,

        /// Latitude for every cast, instead of the configured method
        #[arg(long, allow_negative_numbers = true)]
        latitude: Option<f64>,

        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Move a processed cast into the approved archive.
    Approve {
        cast: String,

        /// Comment stored with the approval
        #[arg(short = 'm', long, default_value = "")]
        comment: String,
    },
    /// Show where casts are in their lifecycle.
    Status {
        /// Base names (default: every raw cast)
        casts: Vec<String>,

        #[arg(long)]
        json: bool,
    },
    /// Show which configuration folder a serial number and date resolve to.
    Resolve {
        serial_number: String,

        /// Cast date, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
        date: String,
    },
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a default config file if none exists.
    Init,
    /// Print the effective configuration.
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut manager = ConfigManager::new(&config_path);

    if let Commands::Config {
        command: ConfigCommands::Init,
    } = cli.command
    {
        manager
            .load_or_create()
            .with_context(|| format!("Failed to initialize {}", config_path.display()))?;
        println!("Config ready at {}", config_path.display());
        return Ok(());
    }

    let snapshot = manager
        .load()
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let logging = &snapshot.settings().logging;
    let _guard = start_logging(&cli, logging.level, &snapshot.logs_dir(), logging.file_log);
    tracing::debug!("Loaded config from {}", config_path.display());

    match cli.command {
        Commands::Process {
            casts,
            all,
            latitude,
            workers,
            json,
        } => {
            manager
                .ensure_dirs_exist()
                .context("Failed to prepare directories")?;
            commands::process(
                snapshot,
                commands::ProcessArgs {
                    casts,
                    all,
                    latitude,
                    workers,
                    json,
                },
            )
        }
        Commands::Approve { cast, comment } => commands::approve(&snapshot, &cast, &comment),
        Commands::Status { casts, json } => commands::status(&snapshot, &casts, json),
        Commands::Resolve {
            serial_number,
            date,
        } => commands::resolve(&snapshot, &serial_number, &date),
        Commands::Config {
            command: ConfigCommands::Show,
        } => commands::show_config(&snapshot),
        Commands::Config {
            command: ConfigCommands::Init,
        } => Ok(()),
    }
}

fn start_logging(
    cli: &Cli,
    configured: LogLevel,
    logs_dir: &Path,
    file_log: bool,
) -> Option<WorkerGuard> {
    let level = cli.log_level.unwrap_or(configured);
    let log_dir = file_log.then_some(logs_dir);
    if let Some(dir) = log_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Cannot create log dir {}: {}", dir.display(), e);
            return init_tracing(level, None);
        }
    }
    init_tracing(level, log_dir)
}

/// `./config.toml` if present, else the platform config directory.
fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    ProjectDirs::from("", "", "ctd-proc")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .unwrap_or(local)
}
