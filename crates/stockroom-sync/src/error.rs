//! Error types for stockroom-sync

use thiserror::Error;

/// Result type alias using stockroom-sync's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for storage-level operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in stockroom-sync operations
#[derive(Error, Debug)]
pub enum Error {
    /// Classified storage error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity type not present in the schema registry
    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    /// Record payload missing required sync fields
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Remote store could not be reached when it was required
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// A required rebuild of the local store did not complete
    #[error("Local store rebuild failed: {0}")]
    RebuildFailed(String),

    /// Schema registry is misconfigured
    #[error("Schema registry error: {0}")]
    Registry(String),
}

/// Storage failures, classified once by the storage adapter.
///
/// Callers branch on the variant, never on the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A foreign key pointed at a record that does not exist
    #[error("Referential integrity error: {0}")]
    ReferentialIntegrity(String),

    /// A record with the same identity already exists
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// A required table is missing
    #[error("Schema mismatch: table '{0}' does not exist")]
    SchemaMismatch(String),

    /// The active transaction was aborted by the store
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// The store client is missing or closed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other driver failure
    #[error("Store error: {0}")]
    Other(String),
}
