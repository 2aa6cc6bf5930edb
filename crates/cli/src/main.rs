//! Printline CLI - migrations, ShipStation sync and print queue processing.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! pl-cli migrate
//!
//! # Sync orders modified since the last checkpoint
//! pl-cli sync full
//!
//! # Resume the last failed full sync
//! pl-cli sync full --resume
//!
//! # Sync the last three days, every status
//! pl-cli sync --all-statuses recent --days 3
//!
//! # Sync ShipStation tags
//! pl-cli tags
//!
//! # Build print tasks for orders that have none
//! pl-cli process --limit 50
//!
//! # Rebuild one order's tasks, keeping the text already on them
//! pl-cli process --order-id 114-1234567-1234567 --force-recreate --preserve-text
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `sync` - Mirror ShipStation orders into the database
//! - `tags` - Mirror ShipStation tags
//! - `process` - Resolve personalizations and write print tasks

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pl-cli")]
#[command(author, version, about = "Printline order sync and print queue tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Sync orders from ShipStation
    Sync {
        #[command(flatten)]
        flags: SyncFlags,

        #[command(subcommand)]
        mode: SyncCommand,
    },
    /// Sync ShipStation tags
    Tags,
    /// Generate print tasks from synced orders
    Process(ProcessArgs),
}

#[derive(Args)]
struct SyncFlags {
    /// Log intended writes without touching the database
    #[arg(long)]
    dry_run: bool,

    /// Fetch every order status, not only `awaiting_shipment`
    #[arg(long)]
    all_statuses: bool,

    /// Stop after this many pages
    #[arg(long)]
    page_limit: Option<u32>,
}

#[derive(Subcommand)]
enum SyncCommand {
    /// Orders modified since the last checkpoint
    Full {
        /// Start from this date instead of the checkpoint
        #[arg(long, value_parser = commands::sync::parse_date)]
        since: Option<DateTime<Utc>>,

        /// Reopen the last failed full sync from its checkpoint
        #[arg(long)]
        resume: bool,
    },
    /// Orders modified in the last few days
    Recent {
        /// Days to look back
        #[arg(long, default_value_t = printline_engine::services::order_sync::DEFAULT_LOOKBACK_DAYS)]
        days: i64,
    },
    /// One order by ShipStation order ID
    Order {
        /// ShipStation order ID
        shipstation_order_id: i64,
    },
    /// Orders placed within a date range
    Range {
        /// First order date (inclusive)
        #[arg(long, value_parser = commands::sync::parse_date)]
        start: Option<DateTime<Utc>>,

        /// Last order date (inclusive)
        #[arg(long, value_parser = commands::sync::parse_date)]
        end: Option<DateTime<Utc>>,
    },
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct ProcessArgs {
    /// Local ID, order number or ShipStation order ID
    #[arg(short, long)]
    order_id: Option<String>,

    /// Maximum number of orders to process
    #[arg(short, long)]
    limit: Option<u32>,

    /// Delete existing tasks before generating new ones
    #[arg(long)]
    force_recreate: bool,

    /// Keep existing custom text when recreating tasks
    #[arg(long)]
    preserve_text: bool,

    /// Extract only; write nothing
    #[arg(long)]
    dry_run: bool,

    /// Do not call the AI; unresolved items become placeholders
    #[arg(long)]
    skip_ai: bool,

    /// Push stored tasks to ShipStation without extracting
    #[arg(long)]
    shipstation_sync_only: bool,

    /// Append a per-order trace to this file
    #[arg(long)]
    debug_file: Option<PathBuf>,

    /// Delete every print task, then exit
    #[arg(long)]
    clear_all: bool,

    /// Confirm a destructive operation
    #[arg(long)]
    confirm: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Sync { flags, mode } => commands::sync::run(&flags, mode).await?,
        Commands::Tags => commands::sync::tags().await?,
        Commands::Process(args) => commands::process::run(args).await?,
    }
    Ok(())
}
