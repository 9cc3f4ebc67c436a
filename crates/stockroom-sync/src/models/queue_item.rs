//! Sync queue item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::record::Record;

/// A unique identifier for a queue item, using UUID v7 (time-sortable).
///
/// Distinct from the payload's record id: the same record may be queued
/// several times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    /// Create a new unique queue item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A local mutation that could not be propagated immediately
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Queue item identity
    pub id: QueueItemId,
    /// Internal entity name from the schema registry
    pub entity_type: String,
    /// Mutation kind
    pub operation: SyncOperation,
    /// Record snapshot at enqueue time
    pub payload: Record,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Whether the mutation reached the remote store
    #[serde(default)]
    pub synced: bool,
    /// Most recent propagation failure
    #[serde(default)]
    pub last_error: Option<String>,
    /// Number of failed propagation attempts
    #[serde(default)]
    pub retry_count: u32,
}

impl SyncQueueItem {
    /// Create a pending item stamped with the current time
    #[must_use]
    pub fn new(entity_type: impl Into<String>, operation: SyncOperation, payload: Record) -> Self {
        Self {
            id: QueueItemId::new(),
            entity_type: entity_type.into(),
            operation,
            payload,
            enqueued_at: crate::util::now_millis(),
            synced: false,
            last_error: None,
            retry_count: 0,
        }
    }

    /// The payload's record id, for logging
    pub fn record_id(&self) -> &str {
        self.payload.id().unwrap_or("<missing>")
    }
}
