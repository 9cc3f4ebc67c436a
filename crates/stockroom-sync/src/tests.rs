use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};

use crate::conflict::Side;
use crate::connectivity::tests::{quick_settings, SwitchProbe};
use crate::connectivity::{
    ConnectivityMonitor, ConnectivitySettings, ConnectivityStatus, ProbeVerdict,
    ReachabilityProbe, RemoteStoreProbe,
};
use crate::db::{LibSqlStore, SyncStore, WriteGuard};
use crate::dispatcher::DispatcherSettings;
use crate::engine::{EngineComponents, SyncEngine};
use crate::error::{Error, StoreError, StoreResult};
use crate::models::{Record, SyncOperation, TableSyncResult};
use crate::orchestrator::OrchestratorSettings;
use crate::queue::SyncQueue;
use crate::schema::entities::{CATEGORY, PRODUCT, USER};
use crate::schema::{EntityDescriptor, SchemaRegistry};

/// libSQL store that records writes and injects failures on request
struct ScriptedStore {
    inner: LibSqlStore,
    writes: Mutex<Vec<String>>,
    aborts_left: AtomicUsize,
    fail_restore: AtomicBool,
    unreachable: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
    rollbacks: AtomicUsize,
    referential_checks: Mutex<Vec<bool>>,
}

impl ScriptedStore {
    async fn new(side: Side) -> Arc<Self> {
        Arc::new(Self {
            inner: LibSqlStore::in_memory(side).await.unwrap(),
            writes: Mutex::new(Vec::new()),
            aborts_left: AtomicUsize::new(0),
            fail_restore: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            insert_delay: Mutex::new(None),
            rollbacks: AtomicUsize::new(0),
            referential_checks: Mutex::new(Vec::new()),
        })
    }

    /// Entity names of successful inserts and updates, in order
    fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn abort_next_writes(&self, count: usize) {
        self.aborts_left.store(count, Ordering::SeqCst);
    }

    fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn delay_inserts(&self, delay: Option<Duration>) {
        *self.insert_delay.lock().unwrap() = delay;
    }

    fn reachable(&self) -> StoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Connectivity("connection refused".to_string()));
        }
        Ok(())
    }

    fn injected_abort(&self) -> StoreResult<()> {
        let abort = self
            .aborts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if abort {
            return Err(StoreError::TransactionAborted("injected abort".to_string()));
        }
        Ok(())
    }

    fn record_write(&self, entity: &EntityDescriptor) {
        self.writes
            .lock()
            .unwrap()
            .push(entity.internal_name.to_string());
    }
}

#[async_trait]
impl SyncStore for ScriptedStore {
    fn side(&self) -> Side {
        self.inner.side()
    }

    async fn ping(&self) -> StoreResult<()> {
        self.reachable()?;
        self.inner.ping().await
    }

    async fn list_tables(&self) -> StoreResult<Vec<String>> {
        self.reachable()?;
        self.inner.list_tables().await
    }

    async fn count_records(&self, entity: &EntityDescriptor) -> StoreResult<u64> {
        self.inner.count_records(entity).await
    }

    async fn find_by_id(&self, entity: &EntityDescriptor, id: &str) -> StoreResult<Option<Record>> {
        self.reachable()?;
        self.inner.find_by_id(entity, id).await
    }

    async fn list_all(&self, entity: &EntityDescriptor) -> StoreResult<Vec<Record>> {
        self.reachable()?;
        self.inner.list_all(entity).await
    }

    async fn insert(&self, entity: &EntityDescriptor, record: &Record) -> StoreResult<()> {
        self.reachable()?;
        let delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.injected_abort()?;
        self.inner.insert(entity, record).await?;
        self.record_write(entity);
        Ok(())
    }

    async fn update(&self, entity: &EntityDescriptor, record: &Record) -> StoreResult<()> {
        self.reachable()?;
        self.injected_abort()?;
        self.inner.update(entity, record).await?;
        self.record_write(entity);
        Ok(())
    }

    async fn delete(
        &self,
        entity: &EntityDescriptor,
        id: &str,
        deleted_at: i64,
    ) -> StoreResult<bool> {
        self.inner.delete(entity, id, deleted_at).await
    }

    async fn begin(&self) -> StoreResult<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> StoreResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }

    async fn set_referential_checks(&self, enabled: bool) -> StoreResult<()> {
        if enabled && self.fail_restore.load(Ordering::SeqCst) {
            return Err(StoreError::Other("pragma rejected".to_string()));
        }
        self.inner.set_referential_checks(enabled).await?;
        self.referential_checks.lock().unwrap().push(enabled);
        Ok(())
    }

    async fn create_schema(&self, registry: &SchemaRegistry) -> StoreResult<usize> {
        self.inner.create_schema(registry).await
    }

    async fn lock_writes(&self) -> WriteGuard {
        self.inner.lock_writes().await
    }
}

struct Harness {
    engine: SyncEngine,
    local: Arc<ScriptedStore>,
    remote: Arc<ScriptedStore>,
    registry: Arc<SchemaRegistry>,
    probe: Arc<SwitchProbe>,
    dir: TempDir,
}

impl Harness {
    fn entity(&self, name: &str) -> &EntityDescriptor {
        self.registry.get(name).unwrap()
    }
}

struct HarnessOptions {
    /// Probe the remote store first, ahead of the switch probe
    remote_probe: bool,
    connectivity: ConnectivitySettings,
    orchestrator: OrchestratorSettings,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            remote_probe: false,
            connectivity: quick_settings(),
            orchestrator: OrchestratorSettings::default(),
        }
    }
}

/// Engine over scripted in-memory stores. The remote always has its schema;
/// the local store is left empty unless `local_schema` is set.
async fn harness(local_schema: bool, online: bool) -> Harness {
    harness_with(local_schema, online, HarnessOptions::default()).await
}

async fn harness_with(local_schema: bool, online: bool, options: HarnessOptions) -> Harness {
    let registry = Arc::new(SchemaRegistry::standard().unwrap());
    let local = ScriptedStore::new(Side::Local).await;
    let remote = ScriptedStore::new(Side::Remote).await;
    remote.create_schema(&registry).await.unwrap();
    if local_schema {
        local.create_schema(&registry).await.unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(SyncQueue::open_in(dir.path()).unwrap());
    let probe = SwitchProbe::new(if online {
        ProbeVerdict::Reachable
    } else {
        ProbeVerdict::Unreachable
    });
    let mut probes: Vec<Arc<dyn ReachabilityProbe>> = Vec::new();
    if options.remote_probe {
        probes.push(Arc::new(RemoteStoreProbe::new(remote.clone())));
    }
    probes.push(probe.clone());
    let connectivity = Arc::new(ConnectivityMonitor::new(probes, options.connectivity));

    let engine = SyncEngine::from_components(EngineComponents {
        registry: registry.clone(),
        local: local.clone(),
        remote: remote.clone(),
        queue,
        connectivity,
        local_path: None,
        orchestrator: options.orchestrator,
        dispatcher: DispatcherSettings::default(),
        min_tables: None,
    });
    Harness {
        engine,
        local,
        remote,
        registry,
        probe,
        dir,
    }
}

fn user(id: &str) -> Record {
    Record::from_value(json!({
        "id": id,
        "username": "cashier",
        "display_name": "Front desk",
        "password_hash": "hash",
        "role": "cashier",
        "created_at": 1,
        "updated_at": 1,
        "deleted_at": null,
    }))
    .unwrap()
}

fn category(id: &str, name: &str, updated_at: i64) -> Record {
    Record::from_value(json!({
        "id": id,
        "name": name,
        "description": null,
        "created_at": 1,
        "updated_at": updated_at,
        "deleted_at": null,
    }))
    .unwrap()
}

fn product(id: &str, category_id: &str, updated_at: i64) -> Record {
    Record::from_value(json!({
        "id": id,
        "name": "Sparkling water",
        "sku": "SW-500",
        "price": 0.99,
        "stock": 48,
        "category_id": category_id,
        "supplier_id": null,
        "created_at": 1,
        "updated_at": updated_at,
        "deleted_at": null,
    }))
    .unwrap()
}

async fn seed(store: &ScriptedStore, entity: &EntityDescriptor, record: &Record) {
    store.inner.insert(entity, record).await.unwrap();
}

/// Wait for the catch-up `start()` launches on its first online check
async fn wait_for_first_sync(engine: &SyncEngine) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = engine.status().await;
        if status.sync.last_sync_at.is_some() && !status.sync.in_progress {
            return;
        }
        assert!(Instant::now() < deadline, "catch-up never finished: {status:?}");
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnection_drains_queue_and_syncs() {
    let h = harness(true, false).await;
    let users = h.entity(USER);
    let categories = h.entity(CATEGORY);
    seed(&h.local, users, &user("u-1")).await;

    assert!(h.engine.start().await.unwrap().is_none());
    assert!(!h.engine.is_online());

    let created = category("cat-1", "Beverages", 10);
    seed(&h.local, categories, &created).await;
    let ticket = h
        .engine
        .notify_change(CATEGORY, SyncOperation::Create, created);
    assert!(!ticket.outcome().await);
    assert!(h.remote.writes().is_empty());
    assert_eq!(h.engine.status().await.sync.pending_count, 1);

    h.probe.set(ProbeVerdict::Reachable);
    assert_eq!(
        h.engine.check_connectivity().await,
        ConnectivityStatus::Online
    );

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = h.engine.status().await;
        if status.sync.last_sync_at.is_some() && !status.sync.in_progress {
            assert_eq!(status.sync.pending_count, 0);
            assert_eq!(status.sync.failed_count, 0);
            break;
        }
        assert!(Instant::now() < deadline, "catch-up never finished: {status:?}");
        sleep(Duration::from_millis(20)).await;
    }

    assert!(h.remote.find_by_id(categories, "cat-1").await.unwrap().is_some());
    assert!(h.remote.find_by_id(users, "u-1").await.unwrap().is_some());
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_after_reconnect_propagates_offline_product() {
    let h = harness(true, false).await;
    let products = h.entity(PRODUCT);
    h.engine.check_connectivity().await;

    let created = product("p-1", "unused", 100).with("category_id", serde_json::Value::Null);
    seed(&h.local, products, &created).await;
    assert!(!h.engine.dispatch(PRODUCT, SyncOperation::Create, created).await);
    assert_eq!(h.engine.status().await.sync.pending_count, 1);

    h.probe.set(ProbeVerdict::Reachable);
    h.engine.check_connectivity().await;
    let result = h.engine.drain_queue().await;
    assert!(result.is_success(), "{:?}", result.errors);

    let status = h.engine.status().await;
    assert_eq!(status.sync.synced_count, 1);
    assert_eq!(status.sync.pending_count, 0);
    assert!(status.queue[0].synced);
    assert!(h.remote.find_by_id(products, "p-1").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_resolves_conflicts_without_writing_back() {
    let h = harness(true, true).await;
    let categories = h.entity(CATEGORY);
    seed(&h.local, categories, &category("cat-1", "Local edit", 30)).await;
    seed(&h.remote, categories, &category("cat-1", "Remote edit", 20)).await;
    seed(&h.local, categories, &category("cat-2", "Stale local", 5)).await;
    seed(&h.remote, categories, &category("cat-2", "Fresh remote", 25)).await;

    let result = h.engine.pull_all().await;
    assert!(result.is_success(), "{:?}", result.errors);
    assert!(h.remote.writes().is_empty());

    let kept = h.local.find_by_id(categories, "cat-1").await.unwrap().unwrap();
    assert_eq!(kept.get("name"), Some(&json!("Local edit")));
    let replaced = h.local.find_by_id(categories, "cat-2").await.unwrap().unwrap();
    assert_eq!(replaced.get("name"), Some(&json!("Fresh remote")));

    let conflicts = h.engine.status().await.recent_conflicts;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].record_id, "cat-1");
    assert_eq!(conflicts[0].kept, Side::Local);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_rebuilds_empty_local_store_critical_entity_first() {
    let h = harness(false, true).await;
    seed(&h.remote, h.entity(CATEGORY), &category("cat-1", "Snacks", 3)).await;
    seed(&h.remote, h.entity(PRODUCT), &product("p-1", "cat-1", 4)).await;
    seed(&h.remote, h.entity(USER), &user("u-1")).await;

    let report = h.engine.start().await.unwrap().expect("rebuild ran");
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.tables_rebuilt, h.registry.len());
    assert_eq!(report.records_synced, 3);

    assert_eq!(h.local.writes(), vec![USER, CATEGORY, PRODUCT]);
    let health = h.engine.check_health().await;
    assert!(health.valid);
    assert!(!health.needs_rebuild);
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_changes_survive_restart_in_order() {
    let h = harness(true, false).await;
    h.engine.check_connectivity().await;

    for index in 0..5 {
        let record = category(&format!("cat-{index}"), "Offline", 10 + index);
        assert!(!h.engine.dispatch(CATEGORY, SyncOperation::Create, record).await);
    }
    assert!(h.remote.writes().is_empty());

    let reopened = SyncQueue::open_in(h.dir.path()).unwrap();
    let ids: Vec<String> = reopened
        .pending()
        .await
        .iter()
        .map(|item| item.record_id().to_string())
        .collect();
    assert_eq!(ids, vec!["cat-0", "cat-1", "cat-2", "cat-3", "cat-4"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_sync_is_idempotent() {
    let h = harness(true, true).await;
    seed(&h.local, h.entity(USER), &user("u-1")).await;
    seed(&h.local, h.entity(CATEGORY), &category("cat-1", "Dairy", 7)).await;
    seed(&h.remote, h.entity(CATEGORY), &category("cat-2", "Bakery", 8)).await;

    let first = h.engine.bidirectional_sync().await;
    assert!(first.is_success());
    let remote_writes = h.remote.writes();
    let local_writes = h.local.writes();
    assert_eq!(remote_writes, vec![USER, CATEGORY]);
    assert_eq!(local_writes, vec![CATEGORY]);

    let second = h.engine.bidirectional_sync().await;
    assert!(second.is_success());
    assert_eq!(h.remote.writes(), remote_writes);
    assert_eq!(h.local.writes(), local_writes);
}

#[tokio::test(flavor = "multi_thread")]
async fn push_applies_parents_before_children() {
    let h = harness(true, true).await;
    seed(&h.local, h.entity(USER), &user("u-1")).await;
    seed(&h.local, h.entity(CATEGORY), &category("cat-1", "Frozen", 2)).await;
    // Child updated earlier than its parent
    seed(&h.local, h.entity(PRODUCT), &product("p-1", "cat-1", 1)).await;

    let result = h.engine.push_all().await;
    assert!(result.is_success(), "{:?}", result.errors);
    assert_eq!(h.remote.writes(), vec![USER, CATEGORY, PRODUCT]);
}

#[tokio::test(flavor = "multi_thread")]
async fn aborted_transaction_retries_record_once() {
    let h = harness(true, true).await;
    let categories = h.entity(CATEGORY);
    seed(&h.local, categories, &category("cat-1", "Produce", 1)).await;
    seed(&h.local, categories, &category("cat-2", "Meat", 2)).await;

    h.remote.abort_next_writes(1);
    let result = h.engine.push_all().await;
    assert!(result.is_success(), "{:?}", result.errors);
    assert_eq!(result.synced, 2);
    assert_eq!(h.remote.inner.count_records(categories).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_abort_fails_only_that_record() {
    let h = harness(true, true).await;
    let categories = h.entity(CATEGORY);
    seed(&h.local, categories, &category("cat-1", "Produce", 1)).await;
    seed(&h.local, categories, &category("cat-2", "Meat", 2)).await;

    h.remote.abort_next_writes(2);
    let result = h.engine.push_all().await;
    assert_eq!(result.synced, 1);
    assert_eq!(result.failed, 1);
    assert!(result.errors[0].contains("cat-1"), "{:?}", result.errors);
    assert!(h.remote.inner.find_by_id(categories, "cat-1").await.unwrap().is_none());
    assert!(h.remote.inner.find_by_id(categories, "cat-2").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_referential_restore_is_reported() {
    let h = harness(true, true).await;
    seed(&h.local, h.entity(CATEGORY), &category("cat-1", "Household", 1)).await;
    h.remote.fail_restore.store(true, Ordering::SeqCst);

    let result = h.engine.push_all().await;
    assert_eq!(result.synced, 1);
    assert!(!result.is_success());
    assert!(result
        .errors
        .iter()
        .any(|error| error.contains("restore referential checks")));
}

#[tokio::test(flavor = "multi_thread")]
async fn rebuild_fails_when_remote_unreachable() {
    let h = harness(false, false).await;
    h.remote.set_unreachable(true);

    let error = h.engine.rebuild().await.unwrap_err();
    assert!(matches!(error, Error::RemoteUnavailable(_)), "{error}");
    assert!(h.local.list_tables().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn incomplete_rebuild_stops_start() {
    let h = harness(false, true).await;
    seed(&h.remote, h.entity(USER), &user("u-1")).await;
    h.remote.inner.execute("DROP TABLE refunds").await.unwrap();

    let error = h.engine.start().await.unwrap_err();
    assert!(
        matches!(&error, Error::RebuildFailed(message) if message.contains("refunds")),
        "{error}"
    );
    assert!(h.engine.check_health().await.needs_rebuild);
    // Nothing was started, so connectivity was never checked
    assert!(!h.engine.is_online());
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_changes_drain_after_remote_outage_on_live_network() {
    let h = harness_with(
        true,
        true,
        HarnessOptions {
            remote_probe: true,
            ..HarnessOptions::default()
        },
    )
    .await;
    let categories = h.entity(CATEGORY);
    seed(&h.local, h.entity(USER), &user("u-1")).await;
    assert!(h.engine.start().await.unwrap().is_none());
    assert!(h.engine.is_online());
    wait_for_first_sync(&h.engine).await;
    assert!(h.engine.retry_pending().await.is_none());

    h.remote.set_unreachable(true);
    assert_eq!(
        h.engine.check_connectivity().await,
        ConnectivityStatus::Online
    );
    let created = category("cat-1", "Cleaning", 10);
    seed(&h.local, categories, &created).await;
    assert!(!h.engine.dispatch(CATEGORY, SyncOperation::Create, created).await);
    assert_eq!(h.engine.status().await.sync.pending_count, 1);
    assert!(h.engine.retry_pending().await.is_none());

    // The remote recovers without the cached status ever changing
    h.remote.set_unreachable(false);
    assert_eq!(
        h.engine.check_connectivity().await,
        ConnectivityStatus::Online
    );
    let result = h.engine.retry_pending().await.expect("catch-up ran");
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.drain.synced, 1);

    assert_eq!(h.engine.status().await.sync.pending_count, 0);
    assert!(h.remote.inner.find_by_id(categories, "cat-1").await.unwrap().is_some());
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn periodic_check_drains_queue_after_remote_outage() {
    let h = harness_with(
        true,
        true,
        HarnessOptions {
            remote_probe: true,
            connectivity: ConnectivitySettings {
                interval: Duration::from_millis(50),
                ..quick_settings()
            },
            ..HarnessOptions::default()
        },
    )
    .await;
    let categories = h.entity(CATEGORY);
    seed(&h.local, h.entity(USER), &user("u-1")).await;
    h.engine.start().await.unwrap();
    wait_for_first_sync(&h.engine).await;

    h.remote.set_unreachable(true);
    let created = category("cat-1", "Garden", 10);
    seed(&h.local, categories, &created).await;
    assert!(!h.engine.dispatch(CATEGORY, SyncOperation::Create, created).await);
    h.remote.set_unreachable(false);

    let deadline = Instant::now() + Duration::from_secs(10);
    while h.remote.inner.find_by_id(categories, "cat-1").await.unwrap().is_none() {
        assert!(Instant::now() < deadline, "queued change never reached the remote store");
        sleep(Duration::from_millis(20)).await;
    }
    assert!(h.engine.is_online());
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_push_times_out_and_rolls_back() {
    let h = harness_with(
        true,
        true,
        HarnessOptions {
            orchestrator: OrchestratorSettings {
                transaction_timeout: Duration::from_millis(200),
                ..OrchestratorSettings::default()
            },
            ..HarnessOptions::default()
        },
    )
    .await;
    let categories = h.entity(CATEGORY);
    seed(&h.local, categories, &category("cat-1", "Tools", 1)).await;
    seed(&h.local, categories, &category("cat-2", "Paint", 2)).await;

    h.remote.delay_inserts(Some(Duration::from_secs(5)));
    let started = Instant::now();
    let result = h.engine.push_all().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.is_success());
    assert!(
        result.errors.iter().any(|error| error.contains("push pass timed out")),
        "{:?}",
        result.errors
    );

    assert!(h.remote.rollbacks.load(Ordering::SeqCst) >= 1);
    assert_eq!(h.remote.referential_checks.lock().unwrap().last(), Some(&true));
    assert_eq!(h.remote.inner.count_records(categories).await.unwrap(), 0);
    let status = h.engine.status().await;
    assert!(!status.sync.in_progress);
    assert!(status.sync.current_operation.is_none());

    // The target store is usable again once writes are fast
    h.remote.delay_inserts(None);
    let retried = h.engine.push_all().await;
    assert!(retried.is_success(), "{:?}", retried.errors);
    assert_eq!(retried.synced, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_before_read_follows_connectivity() {
    let h = harness(true, false).await;
    let categories = h.entity(CATEGORY);
    seed(&h.remote, categories, &category("cat-1", "Pantry", 4)).await;
    h.engine.check_connectivity().await;

    let offline = h.engine.refresh_before_read(CATEGORY).await.unwrap();
    assert!(offline.skipped);
    assert!(h.local.find_by_id(categories, "cat-1").await.unwrap().is_none());

    h.probe.set(ProbeVerdict::Reachable);
    h.engine.check_connectivity().await;
    // The catch-up listener is not registered without start()
    let online = h.engine.refresh_before_read(CATEGORY).await.unwrap();
    assert_eq!(online.synced, 1);
    assert!(h.local.find_by_id(categories, "cat-1").await.unwrap().is_some());

    assert!(h.engine.refresh_before_read("Warehouse").await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn direct_mode_is_a_successful_no_op() {
    let engine = SyncEngine::direct();
    assert!(engine.is_direct());
    assert!(engine.start().await.unwrap().is_none());

    let ticket = engine.notify_change(CATEGORY, SyncOperation::Update, category("cat-1", "x", 1));
    assert!(ticket.outcome().await);
    assert_eq!(engine.push_all().await, TableSyncResult::default());
    assert_eq!(
        engine.refresh_before_read(CATEGORY).await.unwrap(),
        TableSyncResult::default()
    );

    let status = engine.status().await;
    assert!(status.direct_mode);
    assert!(status.queue.is_empty());
    assert_eq!(engine.clear_synced().await.unwrap(), 0);
    engine.shutdown().await;
}
