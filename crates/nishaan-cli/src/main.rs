//! nishaan - command-line companion for the offline layer.
//!
//! Inspects and replays the durable operation queue, installs the offline
//! worker's cache generations, and fetches URLs through the worker the
//! same way the app would.

mod commands;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nishaan_core::Config;

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "nishaan.log";

#[derive(Parser)]
#[command(name = "nishaan", about = "Offline queue and cache tools for nishaan", version)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or replay the operation queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Manage the offline worker's cache generations
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// List the library as the backend has it
    Library {
        /// Only bookmarks carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Write or print the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Fetch a URL through the offline worker
    Fetch {
        url: String,

        /// Send `Accept: text/html`, as a page navigation would
        #[arg(long)]
        html: bool,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Show queued operations, oldest first
    Status {
        /// Print the raw queue as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every queued operation
    Clear,

    /// Replay the queue against the backend if it is reachable
    Replay,

    /// Queue an operation for later replay
    Push {
        /// Operation type, e.g. UPDATE_BOOKMARK
        op_type: String,

        /// Operation payload as JSON, e.g. '{"id":"b1","data":{"title":"X"}}'
        payload: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config (to --config if given)
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config as JSON
    Show,
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Pre-cache the static assets (activates immediately unless configured otherwise)
    Install,

    /// Activate an installed worker and delete stale cache generations
    Activate,

    /// Fetch URLs into the dynamic cache
    CacheUrls {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must be held until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=nishaan_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());
    info!("nishaan starting");

    // Init must work even when the existing file does not parse
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = cli.command
    {
        return commands::config_init(cli.config.as_deref(), force);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Queue { action } => match action {
            QueueAction::Status { json } => commands::queue_status(&config, json)?,
            QueueAction::Clear => commands::queue_clear(&config)?,
            QueueAction::Replay => commands::queue_replay(&config).await?,
            QueueAction::Push { op_type, payload } => {
                commands::queue_push(&config, &op_type, &payload)?
            }
        },
        Commands::Worker { action } => match action {
            WorkerAction::Install => commands::worker_install(&config).await?,
            WorkerAction::Activate => commands::worker_activate(&config)?,
            WorkerAction::CacheUrls { urls } => commands::worker_cache_urls(&config, urls).await?,
        },
        Commands::Library { tag } => commands::library(&config, tag.as_deref()).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init { .. } => {}
            ConfigAction::Show => commands::config_show(&config)?,
        },
        Commands::Fetch { url, html } => commands::fetch(&config, &url, html).await?,
    }

    Ok(())
}
