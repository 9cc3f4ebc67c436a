//! The engine façade used by the surrounding application.
//!
//! Owns every sync component and exposes the two trigger points (change
//! notification and pre-read refresh) plus operational entry points.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::audit::ConflictLog;
use crate::config::SyncEngineConfig;
use crate::conflict::Side;
use crate::connectivity::{ConnectivityMonitor, ConnectivityStatus, Subscription};
use crate::db::{Database, LibSqlStore, SyncStore};
use crate::dispatcher::{DispatchTicket, DispatcherSettings, ImmediateSyncDispatcher};
use crate::error::Result;
use crate::health::DatabaseHealthChecker;
use crate::models::{
    BidirectionalResult, CatchUpResult, ConflictRecord, HealthReport, RebuildReport, Record,
    SyncOperation, SyncQueueItem, SyncStatus, TableSyncResult,
};
use crate::orchestrator::{OrchestratorSettings, TableSyncOrchestrator};
use crate::queue::SyncQueue;
use crate::schema::SchemaRegistry;

/// Read-only operational snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    /// The engine is bypassed and the application talks to the remote store
    pub direct_mode: bool,
    pub connectivity: ConnectivityStatus,
    pub sync: SyncStatus,
    pub queue: Vec<SyncQueueItem>,
    pub recent_conflicts: Vec<ConflictRecord>,
}

/// Pre-built parts for [`SyncEngine::from_components`]
pub struct EngineComponents {
    pub registry: Arc<SchemaRegistry>,
    pub local: Arc<dyn SyncStore>,
    pub remote: Arc<dyn SyncStore>,
    pub queue: Arc<SyncQueue>,
    pub connectivity: Arc<ConnectivityMonitor>,
    /// Local store file, `None` for in-memory stores
    pub local_path: Option<PathBuf>,
    pub orchestrator: OrchestratorSettings,
    pub dispatcher: DispatcherSettings,
    pub min_tables: Option<usize>,
}

/// Runs a catch-up when changes are queued and the remote store answers,
/// whatever the cached connectivity status says
#[derive(Clone)]
struct PendingRetry {
    queue: Arc<SyncQueue>,
    orchestrator: Arc<TableSyncOrchestrator>,
    remote: Arc<dyn SyncStore>,
}

impl PendingRetry {
    async fn run(&self) -> Option<CatchUpResult> {
        let pending = self.queue.pending_count().await;
        if pending == 0 || self.orchestrator.is_busy() {
            return None;
        }
        if let Err(error) = self.remote.ping().await {
            tracing::debug!(
                "{} queued changes waiting; remote store unreachable: {}",
                pending,
                error
            );
            return None;
        }
        tracing::info!(
            "Remote store reachable with {} queued changes; starting catch-up",
            pending
        );
        Some(self.orchestrator.catch_up().await)
    }
}

struct Replicated {
    queue: Arc<SyncQueue>,
    conflicts: Arc<ConflictLog>,
    connectivity: Arc<ConnectivityMonitor>,
    orchestrator: Arc<TableSyncOrchestrator>,
    dispatcher: ImmediateSyncDispatcher,
    health: DatabaseHealthChecker,
    retry: PendingRetry,
    background: Mutex<Vec<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
}

/// Offline-first synchronization engine
pub struct SyncEngine {
    // `None` in direct mode: every entry point is a successful no-op
    replicated: Option<Replicated>,
}

impl SyncEngine {
    /// Open both stores and the queue described by `config`.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn open(config: &SyncEngineConfig) -> Result<Self> {
        if config.direct_remote {
            tracing::info!("Direct remote mode: sync engine disabled");
            return Ok(Self::direct());
        }

        let registry = Arc::new(SchemaRegistry::standard()?);
        let local_path = config.local_db_path();
        let local_db = Database::open_with_recovery(&local_path).await?;
        let remote_db = Database::open_remote(&config.remote).await?;
        let local: Arc<dyn SyncStore> = Arc::new(LibSqlStore::new(local_db, Side::Local));
        let remote: Arc<dyn SyncStore> = Arc::new(LibSqlStore::new(remote_db, Side::Remote));
        let queue = Arc::new(SyncQueue::open_in(&config.data_dir)?);
        let connectivity = Arc::new(ConnectivityMonitor::standard(
            Arc::clone(&remote),
            config.probe_urls.clone(),
            config.connectivity,
        )?);

        tracing::info!("Sync engine opened at {}", config.data_dir.display());
        Ok(Self::from_components(EngineComponents {
            registry,
            local,
            remote,
            queue,
            connectivity,
            local_path: Some(local_path),
            orchestrator: config.orchestrator,
            dispatcher: config.dispatcher,
            min_tables: config.min_tables,
        }))
    }

    /// Engine that bypasses replication entirely
    pub const fn direct() -> Self {
        Self { replicated: None }
    }

    /// Wire an engine from explicit components. Must be called within a Tokio runtime.
    pub fn from_components(components: EngineComponents) -> Self {
        let EngineComponents {
            registry,
            local,
            remote,
            queue,
            connectivity,
            local_path,
            orchestrator,
            dispatcher,
            min_tables,
        } = components;

        let conflicts = Arc::new(ConflictLog::default());
        let orchestrator = Arc::new(TableSyncOrchestrator::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&conflicts),
            orchestrator,
        ));
        let dispatcher = ImmediateSyncDispatcher::new(
            Arc::clone(&remote),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&connectivity),
            Arc::clone(&conflicts),
            dispatcher,
        );
        let retry = PendingRetry {
            queue: Arc::clone(&queue),
            orchestrator: Arc::clone(&orchestrator),
            remote: Arc::clone(&remote),
        };
        let mut health = DatabaseHealthChecker::new(
            local,
            remote,
            registry,
            Arc::clone(&orchestrator),
            local_path,
        );
        if let Some(min_tables) = min_tables {
            health = health.with_min_tables(min_tables);
        }

        Self {
            replicated: Some(Replicated {
                queue,
                conflicts,
                connectivity,
                orchestrator,
                dispatcher,
                health,
                retry,
                background: Mutex::new(Vec::new()),
                subscription: Mutex::new(None),
            }),
        }
    }

    pub const fn is_direct(&self) -> bool {
        self.replicated.is_none()
    }

    /// Validate (and if needed rebuild) the local store, then start the
    /// background connectivity monitor and reconnection catch-up.
    ///
    /// Fails when a required rebuild does not complete.
    pub async fn start(&self) -> Result<Option<RebuildReport>> {
        let Some(engine) = &self.replicated else {
            return Ok(None);
        };

        let rebuild = engine.health.ensure_healthy().await?;

        let orchestrator = Arc::clone(&engine.orchestrator);
        let runtime = tokio::runtime::Handle::current();
        let subscription = engine.connectivity.on_status_change(move |status| {
            if !status.is_online() {
                return;
            }
            let orchestrator = Arc::clone(&orchestrator);
            runtime.spawn(async move {
                tracing::info!("Back online; starting catch-up");
                let result = orchestrator.catch_up().await;
                log_catch_up(&result);
            });
        });
        if let Ok(mut slot) = engine.subscription.lock() {
            if let Some(previous) = slot.replace(subscription) {
                previous.unsubscribe();
            }
        }

        engine.connectivity.check_connectivity().await;
        let retry = engine.retry.clone();
        let monitor = engine.connectivity.spawn_periodic(move |status| {
            let retry = retry.clone();
            async move {
                if !status.is_online() {
                    return;
                }
                if let Some(result) = retry.run().await {
                    log_catch_up(&result);
                }
            }
        });
        if let Ok(mut background) = engine.background.lock() {
            background.push(monitor);
        }
        Ok(rebuild)
    }

    /// Push trigger: propagate a local change in the background
    pub fn notify_change(
        &self,
        entity_type: impl Into<String>,
        operation: SyncOperation,
        record: Record,
    ) -> DispatchTicket {
        match &self.replicated {
            Some(engine) => engine.dispatcher.notify_change(entity_type, operation, record),
            None => DispatchTicket::resolved(true),
        }
    }

    /// Propagate a local change now; `true` when it reached the remote store
    pub async fn dispatch(
        &self,
        entity_type: &str,
        operation: SyncOperation,
        record: Record,
    ) -> bool {
        match &self.replicated {
            Some(engine) => {
                engine
                    .dispatcher
                    .dispatch(entity_type, operation, record)
                    .await
            }
            None => true,
        }
    }

    /// Pull trigger: refresh one entity from the remote store before reading it.
    ///
    /// Skipped when offline.
    pub async fn refresh_before_read(&self, entity_type: &str) -> Result<TableSyncResult> {
        let Some(engine) = &self.replicated else {
            return Ok(TableSyncResult::default());
        };
        if engine.connectivity.is_offline() {
            tracing::debug!(entity = entity_type, "Offline; serving local data");
            return Ok(TableSyncResult::skipped());
        }
        engine.orchestrator.pull_entity(entity_type).await
    }

    pub async fn push_all(&self) -> TableSyncResult {
        match &self.replicated {
            Some(engine) => engine.orchestrator.push_all().await,
            None => TableSyncResult::default(),
        }
    }

    pub async fn pull_all(&self) -> TableSyncResult {
        match &self.replicated {
            Some(engine) => engine.orchestrator.pull_all().await,
            None => TableSyncResult::default(),
        }
    }

    pub async fn bidirectional_sync(&self) -> BidirectionalResult {
        match &self.replicated {
            Some(engine) => engine.orchestrator.bidirectional_sync().await,
            None => BidirectionalResult::default(),
        }
    }

    pub async fn drain_queue(&self) -> TableSyncResult {
        match &self.replicated {
            Some(engine) => engine.orchestrator.drain_queue().await,
            None => TableSyncResult::default(),
        }
    }

    pub async fn catch_up(&self) -> CatchUpResult {
        match &self.replicated {
            Some(engine) => engine.orchestrator.catch_up().await,
            None => CatchUpResult::default(),
        }
    }

    /// Catch up on queued changes once the remote store answers again.
    ///
    /// Covers remote outages the connectivity status never registered. Returns
    /// `None` when nothing is queued, another sync is running or the remote
    /// store is still unreachable.
    pub async fn retry_pending(&self) -> Option<CatchUpResult> {
        match &self.replicated {
            Some(engine) => engine.retry.run().await,
            None => None,
        }
    }

    pub async fn check_connectivity(&self) -> ConnectivityStatus {
        match &self.replicated {
            Some(engine) => engine.connectivity.check_connectivity().await,
            None => ConnectivityStatus::Online,
        }
    }

    pub fn is_online(&self) -> bool {
        self.replicated
            .as_ref()
            .map_or(true, |engine| engine.connectivity.is_online())
    }

    pub async fn check_health(&self) -> HealthReport {
        match &self.replicated {
            Some(engine) => engine.health.check_health().await,
            None => HealthReport {
                exists: true,
                valid: true,
                ..HealthReport::default()
            },
        }
    }

    pub async fn rebuild(&self) -> Result<RebuildReport> {
        match &self.replicated {
            Some(engine) => engine.health.rebuild().await,
            None => Ok(RebuildReport {
                success: true,
                ..RebuildReport::default()
            }),
        }
    }

    /// Snapshot of sync progress, queue contents and recent conflicts
    pub async fn status(&self) -> EngineStatus {
        let Some(engine) = &self.replicated else {
            return EngineStatus {
                direct_mode: true,
                connectivity: ConnectivityStatus::Online,
                sync: SyncStatus::default(),
                queue: Vec::new(),
                recent_conflicts: Vec::new(),
            };
        };

        let queue = engine.queue.snapshot().await;
        let mut sync = engine.orchestrator.status();
        sync.pending_count = queue.iter().filter(|item| !item.synced).count();
        EngineStatus {
            direct_mode: false,
            connectivity: engine.connectivity.status(),
            sync,
            queue,
            recent_conflicts: engine.conflicts.recent(),
        }
    }

    /// Remove synced queue items; returns how many were removed
    pub async fn clear_synced(&self) -> Result<usize> {
        match &self.replicated {
            Some(engine) => engine.queue.clear_synced().await,
            None => Ok(0),
        }
    }

    /// Stop background tasks and flush buffered change notifications
    pub async fn shutdown(self) {
        let Some(engine) = self.replicated else {
            return;
        };

        if let Ok(mut slot) = engine.subscription.lock() {
            if let Some(subscription) = slot.take() {
                subscription.unsubscribe();
            }
        }
        if let Ok(mut background) = engine.background.lock() {
            for task in background.drain(..) {
                task.abort();
            }
        }
        engine.dispatcher.shutdown().await;
        tracing::info!("Sync engine stopped");
    }
}

fn log_catch_up(result: &CatchUpResult) {
    if result.drain.skipped {
        return;
    }
    if result.is_success() {
        tracing::info!(
            "Catch-up complete: {} queued, {} pushed, {} pulled",
            result.drain.synced,
            result.sync.push.synced,
            result.sync.pull.synced
        );
    } else {
        let errors: Vec<&String> = result
            .drain
            .errors
            .iter()
            .chain(&result.sync.push.errors)
            .chain(&result.sync.pull.errors)
            .collect();
        tracing::warn!(
            "Catch-up finished with {} errors; first: {}",
            errors.len(),
            errors.first().map_or("none", |error| error.as_str())
        );
    }
}
