use std::path::Path;

use stockroom_sync::queue::SyncQueue;

use crate::commands::common::{format_queue_lines, now_millis};
use crate::error::CliError;

pub async fn run_queue_list(as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let queue = SyncQueue::open_in(data_dir)?;
    let items = queue.snapshot().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("Sync queue is empty.");
        return Ok(());
    }
    for line in format_queue_lines(&items, now_millis()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_queue_clear_synced(data_dir: &Path) -> Result<usize, CliError> {
    let queue = SyncQueue::open_in(data_dir)?;
    let removed = queue.clear_synced().await?;
    println!("Removed {removed} synced changes");
    Ok(removed)
}
