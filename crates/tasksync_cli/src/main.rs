//! TaskSync CLI
//!
//! Offline task list backed by SQLite, synchronized in batches with a
//! remote authority.
//!
//! # Commands
//!
//! - `add`, `update`, `delete` - Edit tasks locally and queue the change
//! - `list`, `show` - Read local tasks
//! - `sync` - Run one sync pass
//! - `status` - Show the number of queued mutations
//! - `health` - Probe the remote endpoint

mod commands;

use clap::{Parser, Subcommand};
use commands::Context;
use std::path::PathBuf;
use tasksync_engine::{SyncConfig, DEFAULT_SERVER_URL};
use tracing_subscriber::EnvFilter;

/// Offline-first task list with batch synchronization.
#[derive(Parser)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local database file
    #[arg(global = true, long, env = "TASKSYNC_DB", default_value = "tasksync.db")]
    db: PathBuf,

    /// Base URL of the remote API
    #[arg(global = true, long, env = "TASKSYNC_API_URL", default_value = DEFAULT_SERVER_URL)]
    api_url: String,

    /// Maximum number of mutations shipped per sync pass
    #[arg(global = true, long, env = "TASKSYNC_BATCH_SIZE", default_value_t = 50)]
    batch_size: usize,

    /// Batch request timeout in seconds
    #[arg(global = true, long, default_value_t = 15)]
    timeout: u64,

    /// Print JSON instead of text
    #[arg(global = true, long)]
    json: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Task description
        #[arg(short, long)]
        description: Option<String>,

        /// Create the task already completed
        #[arg(short, long)]
        completed: bool,
    },

    /// Update a task
    Update {
        /// Task identity
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New completion flag
        #[arg(short, long)]
        completed: Option<bool>,
    },

    /// Soft-delete a task
    Delete {
        /// Task identity
        id: String,
    },

    /// List tasks
    List {
        /// Only tasks that are pending or errored
        #[arg(short, long)]
        pending: bool,
    },

    /// Show one task
    Show {
        /// Task identity
        id: String,
    },

    /// Run one sync pass
    Sync,

    /// Show the number of queued mutations
    Status,

    /// Check whether the remote endpoint is reachable
    Health,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = SyncConfig::new(cli.api_url)
        .with_batch_size(cli.batch_size)
        .with_request_timeout(std::time::Duration::from_secs(cli.timeout));
    tracing::debug!(db = %cli.db.display(), api_url = %config.server_url, "opening database");
    let ctx = Context::open(&cli.db, config, cli.json)?;

    match cli.command {
        Commands::Add {
            title,
            description,
            completed,
        } => commands::tasks::add(&ctx, title, description, completed)?,
        Commands::Update {
            id,
            title,
            description,
            completed,
        } => commands::tasks::update(&ctx, &id, title, description, completed)?,
        Commands::Delete { id } => commands::tasks::delete(&ctx, &id)?,
        Commands::List { pending } => commands::tasks::list(&ctx, pending)?,
        Commands::Show { id } => commands::tasks::show(&ctx, &id)?,
        Commands::Sync => commands::sync::sync(&ctx)?,
        Commands::Status => commands::sync::status(&ctx)?,
        Commands::Health => commands::sync::health(&ctx)?,
    }

    Ok(())
}
