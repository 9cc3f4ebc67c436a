//! Bounded in-memory log of conflicts where the stored version was kept

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::ConflictRecord;

/// Default number of conflicts retained
pub const DEFAULT_CONFLICT_CAPACITY: usize = 100;

/// Ring buffer of the most recent conflicts, oldest first
pub struct ConflictLog {
    capacity: usize,
    entries: Mutex<VecDeque<ConflictRecord>>,
}

impl Default for ConflictLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CONFLICT_CAPACITY)
    }
}

impl ConflictLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn record(&self, conflict: ConflictRecord) {
        tracing::info!(
            entity = %conflict.entity,
            record_id = %conflict.record_id,
            kept = %conflict.kept,
            "Conflict resolved: {}",
            conflict.reason
        );
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(conflict);
        }
    }

    pub fn recent(&self) -> Vec<ConflictRecord> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
