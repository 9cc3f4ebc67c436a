//! Durable queue of local mutations awaiting propagation.
//!
//! The whole queue is a JSON array rewritten on every mutation. Writes go to
//! a sibling temp file that is synced before being renamed over the original.
//! File IO runs on the blocking pool while the queue lock is held, so writes
//! land in mutation order.

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{QueueItemId, Record, SyncOperation, SyncQueueItem};

/// File name of the persisted queue inside the data directory
pub const QUEUE_FILE_NAME: &str = "sync-queue.json";

/// Insertion-ordered, append-only mutation log
pub struct SyncQueue {
    path: PathBuf,
    items: Mutex<Vec<SyncQueueItem>>,
}

impl SyncQueue {
    /// Load the queue at `path`, starting empty when the file is absent.
    ///
    /// An unparseable file is moved aside and the queue starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let items = load_items(&path)?;
        if !items.is_empty() {
            tracing::info!(
                "Loaded {} queued changes ({} pending) from {}",
                items.len(),
                items.iter().filter(|item| !item.synced).count(),
                path.display()
            );
        }
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    /// Queue stored in `data_dir/sync-queue.json`
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(data_dir.join(QUEUE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a pending mutation and persist the queue.
    ///
    /// Always returns the new item. A persistence failure is logged and the
    /// item stays queued in memory for this process.
    pub async fn enqueue(
        &self,
        entity_type: impl Into<String>,
        operation: SyncOperation,
        payload: Record,
    ) -> SyncQueueItem {
        let item = SyncQueueItem::new(entity_type, operation, payload);
        let mut items = self.items.lock().await;
        items.push(item.clone());
        tracing::debug!(
            entity = %item.entity_type,
            record_id = item.record_id(),
            operation = %item.operation,
            "Queued change"
        );
        self.persist_logged(&items).await;
        item
    }

    /// Items not yet propagated, in insertion order
    pub async fn pending(&self) -> Vec<SyncQueueItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|item| !item.synced)
            .cloned()
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.items.lock().await.iter().filter(|item| !item.synced).count()
    }

    /// Mark an item propagated. Returns whether the item was found.
    pub async fn mark_synced(&self, id: QueueItemId) -> bool {
        self.update_item(id, |item| {
            item.synced = true;
            item.last_error = None;
        })
        .await
    }

    /// Record a failed propagation attempt. Returns whether the item was found.
    pub async fn mark_failed(&self, id: QueueItemId, error: impl Into<String>) -> bool {
        let error = error.into();
        self.update_item(id, move |item| {
            item.retry_count += 1;
            item.last_error = Some(error);
        })
        .await
    }

    /// Remove every synced item. Returns how many were removed.
    pub async fn clear_synced(&self) -> Result<usize> {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|item| !item.synced);
        let removed = before - items.len();
        if removed > 0 {
            self.persist(&items).await?;
            tracing::info!("Cleared {} synced queue items", removed);
        }
        Ok(removed)
    }

    /// Read-only copy of every item
    pub async fn snapshot(&self) -> Vec<SyncQueueItem> {
        self.items.lock().await.clone()
    }

    async fn update_item(&self, id: QueueItemId, apply: impl FnOnce(&mut SyncQueueItem)) -> bool {
        let mut items = self.items.lock().await;
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            tracing::warn!("Queue item {} not found", id);
            return false;
        };
        apply(item);
        self.persist_logged(&items).await;
        true
    }

    async fn persist_logged(&self, items: &[SyncQueueItem]) {
        if let Err(error) = self.persist(items).await {
            tracing::error!(
                "Failed to persist sync queue at {}: {}",
                self.path.display(),
                error
            );
        }
    }

    async fn persist(&self, items: &[SyncQueueItem]) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(items)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &serialized))
            .await
            .map_err(|error| Error::Io(std::io::Error::other(error)))?
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);
    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn load_items(path: &Path) -> Result<Vec<SyncQueueItem>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read(path)?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match serde_json::from_slice::<Vec<SyncQueueItem>>(&raw) {
        Ok(items) => Ok(items),
        Err(error) => {
            let backup = quarantine(path)?;
            tracing::warn!(
                "Sync queue at {} is unreadable ({}); moved to {} and starting empty",
                path.display(),
                error,
                backup.display()
            );
            Ok(Vec::new())
        }
    }
}

fn quarantine(path: &Path) -> Result<PathBuf> {
    let timestamp = crate::util::now_millis();
    let base_name = path
        .file_name()
        .map_or_else(|| QUEUE_FILE_NAME.into(), |name| name.to_string_lossy());
    let backup = path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));
    std::fs::rename(path, &backup)?;
    Ok(backup)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let base_name = path
        .file_name()
        .map_or_else(|| QUEUE_FILE_NAME.into(), |name| name.to_string_lossy());
    path.with_file_name(format!("{base_name}.tmp"))
}
