//! Sync status and operation result models

use serde::{Deserialize, Serialize};

/// Process-wide sync progress, owned by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// A full or table-level sync is running
    pub in_progress: bool,
    /// Completion time of the last sync operation (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Queue items not yet propagated
    pub pending_count: usize,
    /// Records propagated by the last operation
    pub synced_count: usize,
    /// Records that failed in the last operation
    pub failed_count: usize,
    /// Label of the step currently executing, e.g. `push:products`
    pub current_operation: Option<String>,
}

/// Outcome of a push, pull or drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSyncResult {
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// The request was dropped by the single-flight guard
    #[serde(default)]
    pub skipped: bool,
}

impl TableSyncResult {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Fully successful: nothing failed and no error was reported.
    pub fn is_success(&self) -> bool {
        !self.skipped && self.failed == 0 && self.errors.is_empty()
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn merge(&mut self, other: Self) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.errors.extend(other.errors);
        self.skipped |= other.skipped;
    }
}

/// Outcome of a bidirectional sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidirectionalResult {
    pub push: TableSyncResult,
    pub pull: TableSyncResult,
}

impl BidirectionalResult {
    pub fn is_success(&self) -> bool {
        self.push.is_success() && self.pull.is_success()
    }
}

/// Outcome of a reconnection catch-up: queue drain, then full sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchUpResult {
    pub drain: TableSyncResult,
    pub sync: BidirectionalResult,
}

impl CatchUpResult {
    pub fn is_success(&self) -> bool {
        self.drain.is_success() && self.sync.is_success()
    }
}

/// Local store health assessment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// The local store file (or in-memory store) exists
    pub exists: bool,
    /// Enough tables and at least one critical record
    pub valid: bool,
    pub needs_rebuild: bool,
    /// Registered tables present in the local store
    pub table_count: usize,
    /// Rows across all registered tables
    pub record_count: u64,
}

/// Outcome of a local store rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub success: bool,
    pub tables_rebuilt: usize,
    pub records_synced: usize,
    pub errors: Vec<String>,
}
