//! Data models for the sync engine

mod queue_item;
mod record;
mod status;
mod sync_conflict;

pub use queue_item::{QueueItemId, SyncOperation, SyncQueueItem};
pub use record::{
    Record, RecordVersion, CREATED_AT_COLUMN, DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
};
pub use status::{
    BidirectionalResult, CatchUpResult, HealthReport, RebuildReport, SyncStatus, TableSyncResult,
};
pub use sync_conflict::ConflictRecord;
