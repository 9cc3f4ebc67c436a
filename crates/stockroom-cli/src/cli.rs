use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(about = "Operate the Stockroom offline-first sync engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the local store and the sync queue
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the local store without modifying it
    Health {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recreate the local store from the remote store
    Rebuild,
    /// Reconcile the local and remote stores
    Sync {
        /// Which way records flow
        #[arg(long, value_enum, default_value_t = SyncDirection::Both)]
        direction: SyncDirection,
    },
    /// Apply queued offline changes to the remote store
    Drain,
    /// Show connectivity, sync progress and recent conflicts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or prune the offline change queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Run the engine in the background until Ctrl-C
    Watch,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncDirection {
    Push,
    Pull,
    Both,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued changes, oldest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove changes that already reached the remote store
    ClearSynced,
}
