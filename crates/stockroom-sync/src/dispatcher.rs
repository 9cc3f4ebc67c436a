//! Fast path: push each local change to the remote store as it happens.
//!
//! Changes are handed to a single worker, in submission order. Anything that
//! cannot be propagated right away lands in the [`SyncQueue`]. Once the
//! worker falls `capacity` changes behind, new ones skip the remote attempt
//! and are queued directly, still by the same worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::audit::ConflictLog;
use crate::connectivity::ConnectivityMonitor;
use crate::db::SyncStore;
use crate::models::{Record, SyncOperation};
use crate::queue::SyncQueue;
use crate::schema::SchemaRegistry;
use crate::upsert::{self, UpsertOutcome};
use crate::util::now_millis;

/// Worker tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Upper bound on one remote write
    pub timeout: Duration,
    /// Backlog beyond which changes are queued without a remote attempt
    pub capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            capacity: 256,
        }
    }
}

/// Receipt for a submitted change.
///
/// Resolves to `true` when the change reached the remote store. Dropping the
/// ticket does not cancel the dispatch.
#[derive(Debug)]
pub struct DispatchTicket(oneshot::Receiver<bool>);

impl DispatchTicket {
    /// Ticket that is already resolved
    pub(crate) fn resolved(propagated: bool) -> Self {
        let (sender, receiver) = oneshot::channel();
        if sender.send(propagated).is_err() {
            tracing::trace!("Dispatch ticket dropped");
        }
        Self(receiver)
    }

    /// Wait for the dispatch outcome
    pub async fn outcome(self) -> bool {
        self.0.await.unwrap_or(false)
    }
}

struct DispatchJob {
    entity_type: String,
    operation: SyncOperation,
    record: Record,
    // Submitted while the worker was over capacity
    overflow: bool,
    reply: oneshot::Sender<bool>,
}

struct DispatchCore {
    remote: Arc<dyn SyncStore>,
    registry: Arc<SchemaRegistry>,
    queue: Arc<SyncQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    conflicts: Arc<ConflictLog>,
    timeout: Duration,
}

impl DispatchCore {
    async fn dispatch(&self, entity_type: &str, operation: SyncOperation, record: Record) -> bool {
        let record_id = record.id().unwrap_or("<missing>").to_string();

        if self.connectivity.is_offline() {
            tracing::debug!(
                entity = entity_type,
                record_id = %record_id,
                "Offline; queueing change"
            );
            self.queue.enqueue(entity_type, operation, record).await;
            return false;
        }

        let entity = match self.registry.get(entity_type) {
            Ok(entity) => entity,
            Err(error) => {
                tracing::warn!("Cannot dispatch change: {}", error);
                self.queue.enqueue(entity_type, operation, record).await;
                return false;
            }
        };

        let remote = self.remote.as_ref();
        let attempt = async {
            let _writes = remote.lock_writes().await;
            upsert::apply_change(remote, entity, operation, &record, now_millis()).await
        };

        let failure = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(UpsertOutcome::KeptTarget(conflict))) => {
                let reason = format!("remote version kept: {}", conflict.reason);
                self.conflicts.record(conflict);
                reason
            }
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    entity = entity_type,
                    record_id = %record_id,
                    operation = %operation,
                    "Dispatched change ({:?})",
                    outcome
                );
                return true;
            }
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!("timed out after {:?}", self.timeout),
        };

        tracing::warn!(
            entity = entity_type,
            record_id = %record_id,
            operation = %operation,
            "Immediate sync failed ({}); queueing change",
            failure
        );
        self.queue.enqueue(entity_type, operation, record).await;
        false
    }
}

/// Best-effort immediate propagation with queue fallback
pub struct ImmediateSyncDispatcher {
    core: Arc<DispatchCore>,
    sender: mpsc::UnboundedSender<DispatchJob>,
    backlog: Arc<AtomicUsize>,
    capacity: usize,
    worker: JoinHandle<()>,
}

impl ImmediateSyncDispatcher {
    /// Start the dispatcher and its worker. Must be called within a Tokio runtime.
    pub fn new(
        remote: Arc<dyn SyncStore>,
        registry: Arc<SchemaRegistry>,
        queue: Arc<SyncQueue>,
        connectivity: Arc<ConnectivityMonitor>,
        conflicts: Arc<ConflictLog>,
        settings: DispatcherSettings,
    ) -> Self {
        let core = Arc::new(DispatchCore {
            remote,
            registry,
            queue,
            connectivity,
            conflicts,
            timeout: settings.timeout,
        });
        let (sender, receiver) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(run_worker(
            Arc::clone(&core),
            receiver,
            Arc::clone(&backlog),
        ));
        Self {
            core,
            sender,
            backlog,
            capacity: settings.capacity.max(1),
            worker,
        }
    }

    /// Propagate one change now. Returns `true` when it reached the remote store.
    ///
    /// Never waits for connectivity: offline changes are queued immediately.
    pub async fn dispatch(&self, entity_type: &str, operation: SyncOperation, record: Record) -> bool {
        self.core.dispatch(entity_type, operation, record).await
    }

    /// Submit a change to the worker without waiting for it
    pub fn notify_change(
        &self,
        entity_type: impl Into<String>,
        operation: SyncOperation,
        record: Record,
    ) -> DispatchTicket {
        let (reply, receiver) = oneshot::channel();
        let overflow = self.backlog.fetch_add(1, Ordering::SeqCst) >= self.capacity;
        let job = DispatchJob {
            entity_type: entity_type.into(),
            operation,
            record,
            overflow,
            reply,
        };
        if overflow {
            tracing::warn!(
                entity = %job.entity_type,
                "Dispatch worker over capacity; change will be queued directly"
            );
        }

        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            self.backlog.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(
                entity = %job.entity_type,
                "Dispatch worker stopped; queueing change directly"
            );
            let queue = Arc::clone(&self.core.queue);
            tokio::spawn(async move {
                queue.enqueue(job.entity_type, job.operation, job.record).await;
                if job.reply.send(false).is_err() {
                    tracing::trace!("Dispatch ticket dropped");
                }
            });
        }

        DispatchTicket(receiver)
    }

    /// Stop accepting changes and wait for the worker to finish buffered ones
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(error) = self.worker.await {
            tracing::warn!("Dispatcher worker ended abnormally: {}", error);
        }
    }
}

async fn run_worker(
    core: Arc<DispatchCore>,
    mut receiver: mpsc::UnboundedReceiver<DispatchJob>,
    backlog: Arc<AtomicUsize>,
) {
    while let Some(job) = receiver.recv().await {
        let propagated = if job.overflow {
            core.queue
                .enqueue(job.entity_type, job.operation, job.record)
                .await;
            false
        } else {
            core.dispatch(&job.entity_type, job.operation, job.record)
                .await
        };
        backlog.fetch_sub(1, Ordering::SeqCst);
        if job.reply.send(propagated).is_err() {
            tracing::trace!("Dispatch ticket dropped");
        }
    }
    tracing::debug!("Dispatcher worker stopped");
}
