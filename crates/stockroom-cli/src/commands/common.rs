use std::env;
use std::path::PathBuf;

use stockroom_sync::config::default_data_dir;
use stockroom_sync::models::{ConflictRecord, TableSyncResult};
use stockroom_sync::{EngineStatus, SyncEngine, SyncEngineConfig, SyncQueueItem};

use crate::error::CliError;

/// Load engine configuration from the environment, honoring `--data-dir`
pub fn load_config(data_dir: Option<PathBuf>) -> Result<SyncEngineConfig, CliError> {
    let config = SyncEngineConfig::from_env()?;
    Ok(match data_dir {
        Some(path) => config.with_data_dir(path),
        None => config,
    })
}

pub async fn open_engine(data_dir: Option<PathBuf>) -> Result<SyncEngine, CliError> {
    let config = load_config(data_dir)?;
    std::fs::create_dir_all(&config.data_dir)?;
    Ok(SyncEngine::open(&config).await?)
}

/// Data directory without requiring remote credentials
pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> PathBuf {
    cli_data_dir
        .or_else(|| {
            env::var_os("STOCKROOM_DATA_DIR")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .or_else(default_data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Print accumulated errors and turn them into a failing exit status
pub fn finish_operation(operation: &'static str, errors: &[String]) -> Result<(), CliError> {
    if errors.is_empty() {
        return Ok(());
    }
    for error in errors {
        eprintln!("  {error}");
    }
    Err(CliError::Incomplete {
        operation,
        count: errors.len(),
    })
}

pub fn format_result_line(label: &str, result: &TableSyncResult) -> String {
    if result.skipped {
        return format!("{label}: skipped");
    }
    format!(
        "{label}: {} synced, {} failed",
        result.synced, result.failed
    )
}

pub fn format_queue_lines(items: &[SyncQueueItem], now_ms: i64) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let state = if item.synced { "synced " } else { "pending" };
            let mut line = format!(
                "{state}  {:<6}  {:<18}  {}  {}",
                item.operation.label(),
                item.entity_type,
                item.record_id(),
                format_relative_time(item.enqueued_at, now_ms)
            );
            if let Some(error) = &item.last_error {
                line.push_str(&format!("  retries={} last_error={error}", item.retry_count));
            }
            line
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}  {}  kept={} local={} remote={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.entity,
                conflict.record_id,
                conflict.kept,
                conflict.local_updated_at,
                conflict.remote_updated_at
            )
        })
        .collect()
}

pub fn format_status_lines(status: &EngineStatus, now_ms: i64) -> Vec<String> {
    if status.direct_mode {
        return vec!["Mode: direct remote (sync engine disabled)".to_string()];
    }

    let sync = &status.sync;
    let mut lines = vec![
        format!("Connectivity: {}", status.connectivity),
        format!(
            "Last sync: {}",
            sync.last_sync_at.map_or_else(
                || "never".to_string(),
                |at| format!(
                    "{} ({})",
                    format_sync_timestamp(at),
                    format_relative_time(at, now_ms)
                )
            )
        ),
        format!(
            "Last operation: {} synced, {} failed",
            sync.synced_count, sync.failed_count
        ),
        format!("Pending changes: {}", sync.pending_count),
    ];
    if let Some(operation) = &sync.current_operation {
        lines.push(format!("Running: {operation}"));
    }
    if !status.recent_conflicts.is_empty() {
        lines.push(format!(
            "Recent conflicts: {}",
            status.recent_conflicts.len()
        ));
        lines.extend(
            format_conflict_lines(&status.recent_conflicts)
                .into_iter()
                .map(|line| format!("  {line}")),
        );
    }
    lines
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}
