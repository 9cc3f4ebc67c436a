//! Stockroom CLI - operate the offline-first sync engine
//!
//! Health checks, rebuilds, manual syncs and queue inspection for the
//! local store that backs the Stockroom back office.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, QueueCommands};
use crate::commands::common::resolve_data_dir;
use crate::commands::drain::run_drain;
use crate::commands::health::run_health;
use crate::commands::queue::{run_queue_clear_synced, run_queue_list};
use crate::commands::rebuild::run_rebuild;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "stockroom=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir;

    match cli.command {
        Commands::Health { json } => run_health(json, data_dir).await?,
        Commands::Rebuild => run_rebuild(data_dir).await?,
        Commands::Sync { direction } => run_sync(direction, data_dir).await?,
        Commands::Drain => run_drain(data_dir).await?,
        Commands::Status { json } => run_status(json, data_dir).await?,
        Commands::Queue { command } => {
            let data_dir = resolve_data_dir(data_dir);
            match command {
                QueueCommands::List { json } => run_queue_list(json, &data_dir).await?,
                QueueCommands::ClearSynced => {
                    run_queue_clear_synced(&data_dir).await?;
                }
            }
        }
        Commands::Watch => run_watch(data_dir).await?,
    }

    Ok(())
}
