use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sync(#[from] stockroom_sync::Error),
    #[error(transparent)]
    Config(#[from] stockroom_sync::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{operation} finished with {count} errors")]
    Incomplete { operation: &'static str, count: usize },
    #[error("{0} was skipped because another sync is in progress")]
    Busy(&'static str),
}
