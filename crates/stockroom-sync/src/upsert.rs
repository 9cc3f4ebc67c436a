//! Insert-if-absent, else resolve-and-update.
//!
//! Shared by the table orchestrator and the immediate dispatcher so that both
//! paths apply the same last-writer-wins policy.

use crate::conflict::{self, Side};
use crate::db::SyncStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{ConflictRecord, Record, SyncOperation};
use crate::schema::EntityDescriptor;
use crate::util::now_millis;

/// What an upsert did to the target store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Record was absent and has been inserted
    Inserted,
    /// Insert raced with an existing row of the same identity
    Duplicate,
    /// Incoming version won and overwrote the target's fields
    Updated,
    /// Incoming version won but the target already held identical fields
    Unchanged,
    /// Target version is newer and was kept
    KeptTarget(ConflictRecord),
}

/// Upsert `incoming` into `target`.
///
/// The incoming record originates on the opposite side of `target`, which
/// makes it the initiator for tie-breaking.
pub async fn upsert(
    target: &dyn SyncStore,
    entity: &EntityDescriptor,
    incoming: &Record,
) -> StoreResult<UpsertOutcome> {
    let id = incoming
        .id()
        .ok_or_else(|| StoreError::Other(format!("{} record without id", entity.internal_name)))?;
    let initiator = target.side().opposite();

    let Some(existing) = target.find_by_id(entity, id).await? else {
        return match target.insert(entity, incoming).await {
            Ok(()) => Ok(UpsertOutcome::Inserted),
            Err(StoreError::DuplicateIdentity(message)) => {
                tracing::debug!(
                    entity = entity.internal_name,
                    record_id = id,
                    "Duplicate identity on insert, treating as synced: {}",
                    message
                );
                Ok(UpsertOutcome::Duplicate)
            }
            Err(error) => Err(error),
        };
    };

    let (local, remote) = match initiator {
        Side::Local => (incoming, &existing),
        Side::Remote => (&existing, incoming),
    };
    let decision = conflict::resolve(Some(local), Some(remote), initiator);

    if decision.winner != initiator {
        tracing::debug!(
            entity = entity.internal_name,
            record_id = id,
            kept = %decision.winner,
            "Kept stored version: {}",
            decision.reason
        );
        return Ok(UpsertOutcome::KeptTarget(ConflictRecord {
            entity: entity.internal_name.to_string(),
            record_id: id.to_string(),
            kept: decision.winner,
            local_updated_at: local.version().last_modified(),
            remote_updated_at: remote.version().last_modified(),
            resolved_at: now_millis(),
            reason: decision.reason,
        }));
    }

    if same_fields(entity, incoming, &existing) {
        return Ok(UpsertOutcome::Unchanged);
    }

    target.update(entity, incoming).await?;
    Ok(UpsertOutcome::Updated)
}

/// Apply a queued or dispatched mutation to `target`.
///
/// Deletes travel as tombstones dated `changed_at` so they go through the
/// same conflict policy as any other write.
pub async fn apply_change(
    target: &dyn SyncStore,
    entity: &EntityDescriptor,
    operation: SyncOperation,
    payload: &Record,
    changed_at: i64,
) -> StoreResult<UpsertOutcome> {
    match operation {
        SyncOperation::Create | SyncOperation::Update => upsert(target, entity, payload).await,
        SyncOperation::Delete => {
            let tombstone = payload.clone().into_tombstone(changed_at);
            upsert(target, entity, &tombstone).await
        }
    }
}

/// Registered columns carried by `incoming` all match `existing`
fn same_fields(entity: &EntityDescriptor, incoming: &Record, existing: &Record) -> bool {
    entity.all_columns().iter().all(|column| {
        incoming
            .get(column.name)
            .map_or(true, |value| values_match(value, existing.get(column.name)))
    })
}

fn values_match(incoming: &serde_json::Value, existing: Option<&serde_json::Value>) -> bool {
    use serde_json::Value;

    match (incoming, existing) {
        (Value::Null, None) => true,
        (_, None) => false,
        (Value::Number(left), Some(Value::Number(right))) => match (left.as_i64(), right.as_i64()) {
            (Some(left), Some(right)) => left == right,
            _ => left.as_f64() == right.as_f64(),
        },
        (left, Some(right)) => left == right,
    }
}
