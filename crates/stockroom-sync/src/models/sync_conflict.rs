//! Sync conflict model

use serde::{Deserialize, Serialize};

use crate::conflict::Side;

/// A conflict where the stored version was kept over the incoming one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Internal entity name
    pub entity: String,
    /// Record involved in the conflict
    pub record_id: String,
    /// Side whose version was kept
    pub kept: Side,
    /// Local version's last modification (unix ms)
    pub local_updated_at: i64,
    /// Remote version's last modification (unix ms)
    pub remote_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolver explanation
    pub reason: String,
}
