//! Dependency-ordered bulk reconciliation between the local and remote stores.
//!
//! Every entity is applied inside its own transaction on the target store,
//! committed before moving to the next entity. Records rejected for a missing
//! parent are retried once after the first pass completes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::audit::ConflictLog;
use crate::conflict::Side;
use crate::db::SyncStore;
use crate::error::{Result, StoreError, StoreResult};
use crate::models::{
    BidirectionalResult, CatchUpResult, ConflictRecord, Record, SyncQueueItem, SyncStatus,
    TableSyncResult,
};
use crate::queue::SyncQueue;
use crate::schema::{EntityDescriptor, SchemaRegistry};
use crate::upsert::{self, UpsertOutcome};
use crate::util::now_millis;

/// Lower bound on the wait after a remote schema mismatch
pub const MIN_SCHEMA_RETRY: Duration = Duration::from_secs(300);

/// Tunables for bulk sync passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Disable remote foreign-key enforcement while pushing
    pub relax_remote_fk: bool,
    /// Upper bound on one pass over the target store
    pub transaction_timeout: Duration,
    /// Wait after a remote schema mismatch; never below [`MIN_SCHEMA_RETRY`]
    pub schema_retry_after: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            relax_remote_fk: true,
            transaction_timeout: Duration::from_secs(60),
            schema_retry_after: MIN_SCHEMA_RETRY,
        }
    }
}

/// Replication direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local to remote
    Push,
    /// Remote to local
    Pull,
}

impl Direction {
    pub const fn source(self) -> Side {
        match self {
            Self::Push => Side::Local,
            Self::Pull => Side::Remote,
        }
    }

    pub const fn target(self) -> Side {
        self.source().opposite()
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    First,
    Retry,
}

#[derive(Default)]
struct Tally {
    result: TableSyncResult,
    deferred: Vec<Record>,
    conflicts: Vec<ConflictRecord>,
}

enum BatchOutcome {
    Completed(Tally),
    Aborted { index: usize, message: String },
    Failed(StoreError),
}

struct EntityOutcome {
    result: TableSyncResult,
    deferred: Vec<Record>,
}

/// Errors that end the whole operation rather than one record
const fn aborts_operation(error: &StoreError) -> bool {
    matches!(
        error,
        StoreError::Unavailable(_) | StoreError::Connectivity(_)
    )
}

/// Clears the single-flight flag when an operation ends
struct FlightGuard<'a> {
    orchestrator: &'a TableSyncOrchestrator,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.update_status(|status| {
            status.in_progress = false;
            status.current_operation = None;
        });
        self.orchestrator.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Bulk push, pull and queue drain with a single-flight guard
pub struct TableSyncOrchestrator {
    local: Arc<dyn SyncStore>,
    remote: Arc<dyn SyncStore>,
    registry: Arc<SchemaRegistry>,
    queue: Arc<SyncQueue>,
    conflicts: Arc<ConflictLog>,
    settings: OrchestratorSettings,
    status: RwLock<SyncStatus>,
    in_flight: AtomicBool,
    schema_blocked_until: Mutex<Option<Instant>>,
}

impl TableSyncOrchestrator {
    pub fn new(
        local: Arc<dyn SyncStore>,
        remote: Arc<dyn SyncStore>,
        registry: Arc<SchemaRegistry>,
        queue: Arc<SyncQueue>,
        conflicts: Arc<ConflictLog>,
        settings: OrchestratorSettings,
    ) -> Self {
        let settings = OrchestratorSettings {
            schema_retry_after: settings.schema_retry_after.max(MIN_SCHEMA_RETRY),
            ..settings
        };
        Self {
            local,
            remote,
            registry,
            queue,
            conflicts,
            settings,
            status: RwLock::new(SyncStatus::default()),
            in_flight: AtomicBool::new(false),
            schema_blocked_until: Mutex::new(None),
        }
    }

    pub const fn settings(&self) -> OrchestratorSettings {
        self.settings
    }

    /// Snapshot of the current sync status
    pub fn status(&self) -> SyncStatus {
        self.status
            .read()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    /// Whether an operation currently holds the single-flight guard
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Local to remote for every entity, in ascending dependency order
    pub async fn push_all(&self) -> TableSyncResult {
        let Some(_flight) = self.try_begin("push") else {
            return TableSyncResult::skipped();
        };
        let entities: Vec<&EntityDescriptor> = self.registry.ordered().iter().collect();
        let result = self.run_pass(Direction::Push, &entities).await;
        self.finish(result.synced, result.failed).await;
        result
    }

    /// Remote to local for every pull-enabled entity, in ascending dependency order
    pub async fn pull_all(&self) -> TableSyncResult {
        let Some(_flight) = self.try_begin("pull") else {
            return TableSyncResult::skipped();
        };
        let result = self.pull_inner().await;
        self.finish(result.synced, result.failed).await;
        result
    }

    /// Push, then pull. A failing push does not prevent the pull.
    pub async fn bidirectional_sync(&self) -> BidirectionalResult {
        let Some(_flight) = self.try_begin("sync") else {
            return BidirectionalResult {
                push: TableSyncResult::skipped(),
                pull: TableSyncResult::skipped(),
            };
        };
        let result = self.bidirectional_inner().await;
        self.finish(
            result.push.synced + result.pull.synced,
            result.push.failed + result.pull.failed,
        )
        .await;
        result
    }

    /// Apply every pending queue item to the remote store, in insertion order
    pub async fn drain_queue(&self) -> TableSyncResult {
        let Some(_flight) = self.try_begin("drain") else {
            return TableSyncResult::skipped();
        };
        let result = self.drain_inner().await;
        self.finish(result.synced, result.failed).await;
        result
    }

    /// Drain the queue, then run a full bidirectional sync to catch drift
    pub async fn catch_up(&self) -> CatchUpResult {
        let Some(_flight) = self.try_begin("catch-up") else {
            return CatchUpResult {
                drain: TableSyncResult::skipped(),
                sync: BidirectionalResult {
                    push: TableSyncResult::skipped(),
                    pull: TableSyncResult::skipped(),
                },
            };
        };
        let drain = self.drain_inner().await;
        let sync = self.bidirectional_inner().await;
        self.finish(
            drain.synced + sync.push.synced + sync.pull.synced,
            drain.failed + sync.push.failed + sync.pull.failed,
        )
        .await;
        CatchUpResult { drain, sync }
    }

    /// Pull a single entity from the remote store.
    ///
    /// Push-only entities and calls made while another operation runs are
    /// skipped.
    pub async fn pull_entity(&self, internal_name: &str) -> Result<TableSyncResult> {
        let entity = self.registry.get(internal_name)?;
        if !entity.pulls_from_remote() {
            tracing::debug!(
                entity = entity.internal_name,
                "Entity is push-only; skipping pull"
            );
            return Ok(TableSyncResult::skipped());
        }

        let label = format!("pull:{}", entity.local_table);
        let Some(_flight) = self.try_begin(&label) else {
            return Ok(TableSyncResult::skipped());
        };
        let result = self.run_pass(Direction::Pull, &[entity]).await;
        self.finish(result.synced, result.failed).await;
        Ok(result)
    }

    /// Pull every entity, push-only ones included, critical entity first
    pub async fn pull_for_rebuild(&self) -> TableSyncResult {
        let Some(_flight) = self.try_begin("rebuild") else {
            return TableSyncResult::skipped();
        };
        let order = self.registry.rebuild_order();
        let result = self.run_pass(Direction::Pull, &order).await;
        self.finish(result.synced, result.failed).await;
        result
    }

    async fn pull_inner(&self) -> TableSyncResult {
        let entities: Vec<&EntityDescriptor> = self.registry.pull_order().collect();
        self.run_pass(Direction::Pull, &entities).await
    }

    async fn bidirectional_inner(&self) -> BidirectionalResult {
        let entities: Vec<&EntityDescriptor> = self.registry.ordered().iter().collect();
        let push = self.run_pass(Direction::Push, &entities).await;
        let pull = self.pull_inner().await;
        BidirectionalResult { push, pull }
    }

    fn try_begin(&self, label: &str) -> Option<FlightGuard<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("Sync already in progress; ignoring {} request", label);
            return None;
        }
        self.update_status(|status| {
            status.in_progress = true;
            status.current_operation = Some(label.to_string());
        });
        Some(FlightGuard { orchestrator: self })
    }

    async fn finish(&self, synced: usize, failed: usize) {
        let pending = self.queue.pending_count().await;
        self.update_status(|status| {
            status.last_sync_at = Some(now_millis());
            status.synced_count = synced;
            status.failed_count = failed;
            status.pending_count = pending;
        });
    }

    fn update_status(&self, apply: impl FnOnce(&mut SyncStatus)) {
        if let Ok(mut status) = self.status.write() {
            apply(&mut status);
        }
    }

    fn set_operation(&self, label: String) {
        self.update_status(|status| status.current_operation = Some(label));
    }

    fn store(&self, side: Side) -> &dyn SyncStore {
        match side {
            Side::Local => self.local.as_ref(),
            Side::Remote => self.remote.as_ref(),
        }
    }

    /// Fail fast, and back off, when registered tables are missing remotely
    async fn check_remote_schema(&self) -> std::result::Result<(), String> {
        if let Ok(blocked) = self.schema_blocked_until.lock() {
            if let Some(until) = *blocked {
                let now = Instant::now();
                if now < until {
                    return Err(format!(
                        "Remote schema check deferred for another {}s after a schema mismatch",
                        (until - now).as_secs()
                    ));
                }
            }
        }

        let tables: HashSet<String> = self
            .remote
            .list_tables()
            .await
            .map_err(|error| format!("Failed to inspect remote schema: {error}"))?
            .into_iter()
            .collect();
        let missing: Vec<&str> = self
            .registry
            .ordered()
            .iter()
            .map(|entity| entity.remote_table)
            .filter(|table| !tables.contains(*table))
            .collect();

        if let Some(first) = missing.first() {
            if let Ok(mut blocked) = self.schema_blocked_until.lock() {
                *blocked = Some(Instant::now() + self.settings.schema_retry_after);
            }
            let error = StoreError::SchemaMismatch((*first).to_string());
            tracing::error!(
                missing = %missing.join(", "),
                "{}; remote sync suspended for {}s",
                error,
                self.settings.schema_retry_after.as_secs()
            );
            return Err(format!("{error} (missing: {})", missing.join(", ")));
        }

        if let Ok(mut blocked) = self.schema_blocked_until.lock() {
            *blocked = None;
        }
        Ok(())
    }

    /// One direction over `entities`, bounded by the transaction timeout
    async fn run_pass(
        &self,
        direction: Direction,
        entities: &[&EntityDescriptor],
    ) -> TableSyncResult {
        let mut result = TableSyncResult::default();
        if entities.is_empty() {
            return result;
        }
        if let Err(message) = self.check_remote_schema().await {
            result.record_error(message);
            return result;
        }

        let target = self.store(direction.target());
        let relax = direction == Direction::Push && self.settings.relax_remote_fk;
        tracing::info!(
            direction = direction.label(),
            entities = entities.len(),
            "Starting {} pass",
            direction.label()
        );

        let pass = self.run_entities(direction, entities, relax);
        match tokio::time::timeout(self.settings.transaction_timeout, pass).await {
            Ok(pass_result) => result.merge(pass_result),
            Err(_) => {
                tracing::error!(
                    direction = direction.label(),
                    "Pass exceeded {:?}; rolling back",
                    self.settings.transaction_timeout
                );
                if let Err(error) = target.rollback().await {
                    tracing::debug!("Rollback after timeout failed: {}", error);
                }
                result.record_error(format!(
                    "{} pass timed out after {:?}",
                    direction.label(),
                    self.settings.transaction_timeout
                ));
            }
        }

        if relax {
            if let Err(error) = target.set_referential_checks(true).await {
                tracing::error!(
                    "Failed to restore referential checks on {} store: {}",
                    target.side(),
                    error
                );
                result.record_error(format!(
                    "Failed to restore referential checks on {} store: {error}",
                    target.side()
                ));
            }
        }

        tracing::info!(
            direction = direction.label(),
            synced = result.synced,
            failed = result.failed,
            errors = result.errors.len(),
            "Finished {} pass",
            direction.label()
        );
        result
    }

    async fn run_entities(
        &self,
        direction: Direction,
        entities: &[&EntityDescriptor],
        relax: bool,
    ) -> TableSyncResult {
        let source = self.store(direction.source());
        let target = self.store(direction.target());
        let mut result = TableSyncResult::default();
        let mut deferred: Vec<(&EntityDescriptor, Vec<Record>)> = Vec::new();

        for &entity in entities {
            let table = entity.table_for(direction.target());
            self.set_operation(format!("{}:{table}", direction.label()));

            let records = match source.list_all(entity).await {
                Ok(records) => records,
                Err(error) => {
                    result.record_error(format!(
                        "{}: failed to read {} records: {error}",
                        entity.internal_name,
                        direction.source()
                    ));
                    if aborts_operation(&error) {
                        return result;
                    }
                    continue;
                }
            };

            tracing::debug!(
                entity = entity.internal_name,
                direction = direction.label(),
                "Applying {} records",
                records.len()
            );
            match self
                .apply_entity(target, entity, &records, relax, Pass::First)
                .await
            {
                Ok(outcome) => {
                    result.merge(outcome.result);
                    if !outcome.deferred.is_empty() {
                        deferred.push((entity, outcome.deferred));
                    }
                }
                Err(error) => {
                    result.failed += records.len();
                    result.record_error(format!("{}: {error}", entity.internal_name));
                    if aborts_operation(&error) {
                        return result;
                    }
                }
            }
        }

        if !deferred.is_empty() {
            let count: usize = deferred.iter().map(|(_, records)| records.len()).sum();
            tracing::info!(
                direction = direction.label(),
                "Retrying {} records rejected for missing references",
                count
            );
        }
        for (entity, records) in deferred {
            let table = entity.table_for(direction.target());
            self.set_operation(format!("{}:{table}:retry", direction.label()));
            match self
                .apply_entity(target, entity, &records, relax, Pass::Retry)
                .await
            {
                Ok(outcome) => result.merge(outcome.result),
                Err(error) => {
                    result.failed += records.len();
                    result.record_error(format!("{}: {error}", entity.internal_name));
                    if aborts_operation(&error) {
                        return result;
                    }
                }
            }
        }

        result
    }

    /// Apply `records` inside one transaction.
    ///
    /// An aborted transaction is restarted and the record retried once; a
    /// second abort marks that record failed and the rest are replayed.
    async fn apply_entity(
        &self,
        target: &dyn SyncStore,
        entity: &EntityDescriptor,
        records: &[Record],
        relax: bool,
        pass: Pass,
    ) -> StoreResult<EntityOutcome> {
        if records.is_empty() {
            return Ok(EntityOutcome {
                result: TableSyncResult::default(),
                deferred: Vec::new(),
            });
        }

        let _writes = target.lock_writes().await;
        let mut retried = HashSet::new();
        let mut skipped = HashSet::new();
        let mut skipped_errors = Vec::new();

        loop {
            if relax {
                target.set_referential_checks(false).await?;
            }
            target.begin().await?;

            match self.apply_batch(target, entity, records, &skipped, pass).await {
                BatchOutcome::Completed(mut tally) => {
                    if let Err(error) = target.commit().await {
                        if let Err(rollback_error) = target.rollback().await {
                            tracing::debug!("Rollback after failed commit: {}", rollback_error);
                        }
                        return Err(error);
                    }
                    for conflict in tally.conflicts {
                        self.conflicts.record(conflict);
                    }
                    tally.result.failed += skipped.len();
                    tally.result.errors.extend(skipped_errors);
                    return Ok(EntityOutcome {
                        result: tally.result,
                        deferred: tally.deferred,
                    });
                }
                BatchOutcome::Aborted { index, message } => {
                    if let Err(error) = target.rollback().await {
                        tracing::debug!("Rollback after abort failed: {}", error);
                    }
                    let record_id = records[index].id().unwrap_or("<missing>");
                    if retried.insert(index) {
                        tracing::warn!(
                            entity = entity.internal_name,
                            record_id,
                            "Transaction aborted ({}); restarting and retrying record",
                            message
                        );
                    } else {
                        tracing::warn!(
                            entity = entity.internal_name,
                            record_id,
                            "Transaction aborted again ({}); marking record failed",
                            message
                        );
                        skipped.insert(index);
                        skipped_errors.push(format!(
                            "{} {record_id}: transaction aborted: {message}",
                            entity.internal_name
                        ));
                    }
                }
                BatchOutcome::Failed(error) => {
                    if let Err(rollback_error) = target.rollback().await {
                        tracing::debug!("Rollback after failure: {}", rollback_error);
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn apply_batch(
        &self,
        target: &dyn SyncStore,
        entity: &EntityDescriptor,
        records: &[Record],
        skipped: &HashSet<usize>,
        pass: Pass,
    ) -> BatchOutcome {
        let mut tally = Tally::default();

        for (index, record) in records.iter().enumerate() {
            if skipped.contains(&index) {
                continue;
            }
            let record_id = record.id().unwrap_or("<missing>");

            match upsert::upsert(target, entity, record).await {
                Ok(outcome) => {
                    if let UpsertOutcome::KeptTarget(conflict) = outcome {
                        tally.conflicts.push(conflict);
                    }
                    tally.result.synced += 1;
                }
                Err(StoreError::ReferentialIntegrity(message)) => match pass {
                    Pass::First => {
                        tracing::debug!(
                            entity = entity.internal_name,
                            record_id,
                            "Deferring record with missing reference: {}",
                            message
                        );
                        tally.deferred.push(record.clone());
                    }
                    Pass::Retry => {
                        let missing = self.missing_references(target, entity, record).await;
                        tracing::warn!(
                            entity = entity.internal_name,
                            record_id,
                            missing = %missing,
                            "Record still references missing parents"
                        );
                        tally.result.failed += 1;
                        tally.result.record_error(format!(
                            "{} {record_id}: missing reference {missing}",
                            entity.internal_name
                        ));
                    }
                },
                Err(StoreError::TransactionAborted(message)) => {
                    return BatchOutcome::Aborted { index, message };
                }
                Err(error) if aborts_operation(&error) => return BatchOutcome::Failed(error),
                Err(error) => {
                    tracing::warn!(
                        entity = entity.internal_name,
                        record_id,
                        "Failed to apply record: {}",
                        error
                    );
                    tally.result.failed += 1;
                    tally
                        .result
                        .record_error(format!("{} {record_id}: {error}", entity.internal_name));
                }
            }
        }

        BatchOutcome::Completed(tally)
    }

    /// Describe the foreign keys of `record` whose parents are absent from `target`
    async fn missing_references(
        &self,
        target: &dyn SyncStore,
        entity: &EntityDescriptor,
        record: &Record,
    ) -> String {
        let mut missing = Vec::new();
        for (column, parent_name) in entity.foreign_keys() {
            let Some(parent_id) = record.get(column).and_then(Value::as_str) else {
                continue;
            };
            let Ok(parent) = self.registry.get(parent_name) else {
                continue;
            };
            match target.find_by_id(parent, parent_id).await {
                Ok(Some(_)) => {}
                Ok(None) => missing.push(format!("{column} -> {parent_name} {parent_id}")),
                Err(error) => missing.push(format!(
                    "{column} -> {parent_name} {parent_id} (lookup failed: {error})"
                )),
            }
        }

        if missing.is_empty() {
            "(unresolved)".to_string()
        } else {
            missing.join(", ")
        }
    }

    async fn drain_inner(&self) -> TableSyncResult {
        let mut result = TableSyncResult::default();
        let pending = self.queue.pending().await;
        if pending.is_empty() {
            return result;
        }
        if let Err(message) = self.check_remote_schema().await {
            result.record_error(message);
            return result;
        }

        tracing::info!("Draining {} queued changes", pending.len());
        let mut deferred: Vec<&SyncQueueItem> = Vec::new();

        for (position, item) in pending.iter().enumerate() {
            self.set_operation(format!("drain:{}", item.entity_type));
            match self.apply_queued(item).await {
                Ok(()) => result.synced += 1,
                Err(StoreError::ReferentialIntegrity(message)) => {
                    tracing::debug!(
                        entity = %item.entity_type,
                        record_id = item.record_id(),
                        "Deferring queued change with missing reference: {}",
                        message
                    );
                    deferred.push(item);
                }
                Err(error) => {
                    self.fail_queued(item, &error, &mut result).await;
                    if aborts_operation(&error) {
                        result.record_error(format!(
                            "Drain stopped with {} changes left",
                            pending.len() - position - 1 + deferred.len()
                        ));
                        return result;
                    }
                }
            }
        }

        for item in deferred {
            self.set_operation(format!("drain:{}:retry", item.entity_type));
            match self.apply_queued(item).await {
                Ok(()) => result.synced += 1,
                Err(StoreError::ReferentialIntegrity(_)) => {
                    let missing = match self.registry.get(&item.entity_type) {
                        Ok(entity) => {
                            self.missing_references(self.remote.as_ref(), entity, &item.payload)
                                .await
                        }
                        Err(_) => "(unresolved)".to_string(),
                    };
                    let message = format!(
                        "{} {}: missing reference {missing}",
                        item.entity_type,
                        item.record_id()
                    );
                    tracing::warn!("Queued change still failing: {}", message);
                    self.queue.mark_failed(item.id, message.clone()).await;
                    result.failed += 1;
                    result.record_error(message);
                }
                Err(error) => {
                    self.fail_queued(item, &error, &mut result).await;
                    if aborts_operation(&error) {
                        return result;
                    }
                }
            }
        }

        result
    }

    async fn fail_queued(
        &self,
        item: &SyncQueueItem,
        error: &StoreError,
        result: &mut TableSyncResult,
    ) {
        tracing::warn!(
            entity = %item.entity_type,
            record_id = item.record_id(),
            "Failed to drain queued change: {}",
            error
        );
        self.queue.mark_failed(item.id, error.to_string()).await;
        result.failed += 1;
        result.record_error(format!(
            "{} {}: {error}",
            item.entity_type,
            item.record_id()
        ));
    }

    /// Apply one queue item to the remote store, retrying a transaction abort once
    async fn apply_queued(&self, item: &SyncQueueItem) -> StoreResult<()> {
        let entity = self
            .registry
            .get(&item.entity_type)
            .map_err(|error| StoreError::Other(error.to_string()))?;
        let remote = self.remote.as_ref();
        let _writes = remote.lock_writes().await;

        let apply = || {
            upsert::apply_change(
                remote,
                entity,
                item.operation,
                &item.payload,
                item.enqueued_at,
            )
        };
        let outcome = match apply().await {
            Err(StoreError::TransactionAborted(message)) => {
                tracing::warn!(
                    entity = entity.internal_name,
                    record_id = item.record_id(),
                    "Transaction aborted ({}); retrying once",
                    message
                );
                apply().await?
            }
            other => other?,
        };

        if let UpsertOutcome::KeptTarget(conflict) = outcome {
            self.conflicts.record(conflict);
        }
        self.queue.mark_synced(item.id).await;
        Ok(())
    }
}
