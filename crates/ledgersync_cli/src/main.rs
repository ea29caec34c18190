//! ledgersync CLI
//!
//! Offline maintenance tools for a ledgersync cache directory.
//!
//! # Commands
//!
//! - `inspect` - List queued operations and sync status
//! - `repair` - Remove operations with malformed identities
//! - `retry` - Put failed operations back into automatic processing
//! - `remove` - Drop one operation by id
//! - `clear` - Drop every queued operation

mod commands;

use clap::{Parser, Subcommand};
use ledgersync_engine::{DEFAULT_QUEUE_KEY, DEFAULT_STATUS_KEY};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ledgersync command-line queue tools.
#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Cache key holding the queue
    #[arg(global = true, long, default_value = DEFAULT_QUEUE_KEY)]
    queue_key: String,

    /// Cache key holding the status record
    #[arg(global = true, long, default_value = DEFAULT_STATUS_KEY)]
    status_key: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List queued operations and sync status
    Inspect {
        /// Only show operations in this state (pending, processing, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove operations whose entity identity is malformed
    Repair {
        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Reset failed operations to pending with a fresh retry budget
    Retry,

    /// Remove one operation
    Remove {
        /// Operation id
        id: String,
    },

    /// Remove every queued operation
    Clear {
        /// Required to actually clear a non-empty queue
        #[arg(long)]
        force: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let keys = commands::Keys {
        queue: cli.queue_key,
        status: cli.status_key,
    };

    match cli.command {
        Commands::Inspect { status, format } => {
            let path = cli.path.ok_or("Cache path required for inspect")?;
            commands::inspect::run(&path, &keys, status.as_deref(), &format)?;
        }
        Commands::Repair { dry_run } => {
            let path = cli.path.ok_or("Cache path required for repair")?;
            commands::repair::run(&path, &keys, dry_run)?;
        }
        Commands::Retry => {
            let path = cli.path.ok_or("Cache path required for retry")?;
            commands::retry::run(&path, &keys)?;
        }
        Commands::Remove { id } => {
            let path = cli.path.ok_or("Cache path required for remove")?;
            commands::remove::run(&path, &keys, &id)?;
        }
        Commands::Clear { force } => {
            let path = cli.path.ok_or("Cache path required for clear")?;
            commands::clear::run(&path, &keys, force)?;
        }
        Commands::Version => {
            println!("ledgersync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
