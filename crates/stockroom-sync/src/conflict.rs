//! Last-writer-wins conflict resolution.
//!
//! Pure decision logic with no I/O. Given the local and remote versions of
//! the same record, decides which side's fields survive.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Record, RecordVersion};

/// One of the two stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub const fn opposite(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of comparing two versions of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDecision {
    pub winner: Side,
    pub reason: String,
}

impl ConflictDecision {
    fn new(winner: Side, reason: impl Into<String>) -> Self {
        Self {
            winner,
            reason: reason.into(),
        }
    }
}

/// Decide which version of a record wins.
///
/// `initiator` is the side that started the write (local for push, remote
/// for pull); it wins exact ties so that a sync always makes progress.
///
/// - present on one side only: that side wins
/// - neither deleted: later `updated_at` (falling back to `created_at`) wins
/// - one deleted: the tombstone wins only when strictly later than the other
///   side's last update
/// - both deleted: the later tombstone wins
pub fn resolve(local: Option<&Record>, remote: Option<&Record>, initiator: Side) -> ConflictDecision {
    match (local, remote) {
        (None, None) => ConflictDecision::new(initiator, "absent on both sides"),
        (Some(_), None) => ConflictDecision::new(Side::Local, "only present locally"),
        (None, Some(_)) => ConflictDecision::new(Side::Remote, "only present remotely"),
        (Some(local), Some(remote)) => {
            resolve_versions(&local.version(), &remote.version(), initiator)
        }
    }
}

/// Version-level comparison used by [`resolve`].
pub fn resolve_versions(
    local: &RecordVersion,
    remote: &RecordVersion,
    initiator: Side,
) -> ConflictDecision {
    match (local.deleted_at, remote.deleted_at) {
        (Some(local_deleted), Some(remote_deleted)) => match local_deleted.cmp(&remote_deleted) {
            Ordering::Greater => ConflictDecision::new(Side::Local, "later local tombstone"),
            Ordering::Less => ConflictDecision::new(Side::Remote, "later remote tombstone"),
            Ordering::Equal => {
                ConflictDecision::new(initiator, "identical tombstones, initiator wins")
            }
        },
        (Some(local_deleted), None) => {
            if local_deleted > remote.last_modified() {
                ConflictDecision::new(Side::Local, "local deletion after last remote update")
            } else {
                ConflictDecision::new(
                    Side::Remote,
                    "remote updated at or after local deletion",
                )
            }
        }
        (None, Some(remote_deleted)) => {
            if remote_deleted > local.last_modified() {
                ConflictDecision::new(Side::Remote, "remote deletion after last local update")
            } else {
                ConflictDecision::new(Side::Local, "local updated at or after remote deletion")
            }
        }
        (None, None) => match local.last_modified().cmp(&remote.last_modified()) {
            Ordering::Greater => ConflictDecision::new(Side::Local, "local is newer"),
            Ordering::Less => ConflictDecision::new(Side::Remote, "remote is newer"),
            Ordering::Equal => ConflictDecision::new(initiator, "same timestamp, initiator wins"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(updated_at: i64, deleted_at: Option<i64>) -> Record {
        let record = Record::from_value(json!({
            "id": "rec-1",
            "created_at": 1,
            "updated_at": updated_at,
        }))
        .unwrap();
        match deleted_at {
            Some(at) => record.with("deleted_at", at),
            None => record,
        }
    }

    #[test]
    fn single_side_wins() {
        let only = record(5, None);
        assert_eq!(resolve(Some(&only), None, Side::Remote).winner, Side::Local);
        assert_eq!(resolve(None, Some(&only), Side::Local).winner, Side::Remote);
        assert_eq!(resolve(None, None, Side::Remote).winner, Side::Remote);
    }

    #[test]
    fn newer_update_wins() {
        let older = record(10, None);
        let newer = record(20, None);
        assert_eq!(resolve(Some(&newer), Some(&older), Side::Remote).winner, Side::Local);
        assert_eq!(resolve(Some(&older), Some(&newer), Side::Local).winner, Side::Remote);
    }

    #[test]
    fn ties_favor_initiator() {
        let a = record(10, None);
        let b = record(10, None);
        assert_eq!(resolve(Some(&a), Some(&b), Side::Local).winner, Side::Local);
        assert_eq!(resolve(Some(&a), Some(&b), Side::Remote).winner, Side::Remote);
    }

    #[test]
    fn falls_back_to_created_at() {
        let local = Record::from_value(json!({"id": "x", "created_at": 30})).unwrap();
        let remote = Record::from_value(json!({"id": "x", "created_at": 5, "updated_at": 20}))
            .unwrap();
        assert_eq!(resolve(Some(&local), Some(&remote), Side::Remote).winner, Side::Local);
    }

    #[test]
    fn tombstone_must_be_strictly_later() {
        let deleted = record(10, Some(10));
        let edited_same_time = record(10, None);
        let edited_later = record(15, None);
        let edited_earlier = record(5, None);

        assert_eq!(
            resolve(Some(&deleted), Some(&edited_same_time), Side::Local).winner,
            Side::Remote
        );
        assert_eq!(
            resolve(Some(&deleted), Some(&edited_later), Side::Local).winner,
            Side::Remote
        );
        assert_eq!(
            resolve(Some(&deleted), Some(&edited_earlier), Side::Remote).winner,
            Side::Local
        );
        assert_eq!(
            resolve(Some(&edited_same_time), Some(&deleted), Side::Remote).winner,
            Side::Local
        );
    }

    #[test]
    fn later_tombstone_wins_when_both_deleted() {
        let early = record(10, Some(10));
        let late = record(12, Some(12));
        assert_eq!(resolve(Some(&early), Some(&late), Side::Local).winner, Side::Remote);
        assert_eq!(resolve(Some(&late), Some(&early), Side::Remote).winner, Side::Local);
    }

    #[test]
    fn resolution_is_deterministic_and_converges() {
        let stamps = [0_i64, 1, 5, 9];
        for &local_updated in &stamps {
            for &remote_updated in &stamps {
                let local = record(local_updated, None);
                let remote = record(remote_updated, None);
                let push = resolve(Some(&local), Some(&remote), Side::Local);
                let pull = resolve(Some(&local), Some(&remote), Side::Remote);
                assert_eq!(push, resolve(Some(&local), Some(&remote), Side::Local));

                if local_updated != remote_updated {
                    // Both directions agree on the later version
                    assert_eq!(push.winner, pull.winner);
                    let expected = if local_updated > remote_updated {
                        Side::Local
                    } else {
                        Side::Remote
                    };
                    assert_eq!(push.winner, expected);
                }
            }
        }
    }
}
