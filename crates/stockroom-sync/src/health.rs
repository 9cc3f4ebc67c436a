//! Local store validation and rebuild from the remote store

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::SyncStore;
use crate::error::{Error, Result};
use crate::models::{HealthReport, RebuildReport};
use crate::orchestrator::TableSyncOrchestrator;
use crate::schema::SchemaRegistry;

/// Verifies the local store and rebuilds it when it is unusable
pub struct DatabaseHealthChecker {
    local: Arc<dyn SyncStore>,
    remote: Arc<dyn SyncStore>,
    registry: Arc<SchemaRegistry>,
    orchestrator: Arc<TableSyncOrchestrator>,
    local_path: Option<PathBuf>,
    min_tables: usize,
}

impl DatabaseHealthChecker {
    /// `local_path` is `None` for in-memory stores, which always exist.
    pub fn new(
        local: Arc<dyn SyncStore>,
        remote: Arc<dyn SyncStore>,
        registry: Arc<SchemaRegistry>,
        orchestrator: Arc<TableSyncOrchestrator>,
        local_path: Option<PathBuf>,
    ) -> Self {
        let min_tables = registry.len();
        Self {
            local,
            remote,
            registry,
            orchestrator,
            local_path,
            min_tables,
        }
    }

    /// Require at least `min_tables` registered tables instead of all of them
    #[must_use]
    pub fn with_min_tables(mut self, min_tables: usize) -> Self {
        self.min_tables = min_tables;
        self
    }

    /// Inspect the local store without modifying it
    pub async fn check_health(&self) -> HealthReport {
        let exists = self.local_path.as_ref().map_or(true, |path| path.exists());
        let mut report = HealthReport {
            exists,
            ..HealthReport::default()
        };
        if !exists {
            report.needs_rebuild = true;
            return report;
        }

        let tables = match self.local.list_tables().await {
            Ok(tables) => tables,
            Err(error) => {
                tracing::warn!("Failed to list local tables: {}", error);
                report.needs_rebuild = true;
                return report;
            }
        };

        let mut critical_records = 0;
        for entity in self.registry.ordered() {
            if !tables.iter().any(|table| table == entity.local_table) {
                continue;
            }
            report.table_count += 1;
            match self.local.count_records(entity).await {
                Ok(count) => {
                    report.record_count += count;
                    if entity.critical {
                        critical_records = count;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        entity = entity.internal_name,
                        "Failed to count local records: {}",
                        error
                    );
                }
            }
        }

        report.valid = report.table_count >= self.min_tables && critical_records > 0;
        report.needs_rebuild = !report.valid;
        tracing::debug!(
            tables = report.table_count,
            records = report.record_count,
            critical_records,
            "Local store health: {}",
            if report.valid { "valid" } else { "invalid" }
        );
        report
    }

    /// Recreate the local schema and pull every entity, critical entity first.
    ///
    /// Fails without touching the local store when the remote is unreachable.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        if let Err(error) = self.remote.ping().await {
            tracing::error!("Cannot rebuild local store: remote unreachable: {}", error);
            return Err(Error::RemoteUnavailable(error.to_string()));
        }

        tracing::info!("Rebuilding local store from remote");
        let tables_rebuilt = self.local.create_schema(&self.registry).await?;
        let pull = self.orchestrator.pull_for_rebuild().await;

        let mut report = RebuildReport {
            success: pull.is_success(),
            tables_rebuilt,
            records_synced: pull.synced,
            errors: pull.errors,
        };
        if pull.skipped {
            report
                .errors
                .push("Rebuild pull skipped: another sync is in progress".to_string());
        }

        if report.success {
            tracing::info!(
                "Rebuilt local store: {} tables created, {} records pulled",
                report.tables_rebuilt,
                report.records_synced
            );
        } else {
            tracing::error!(
                "Local store rebuild incomplete with {} errors",
                report.errors.len()
            );
        }
        Ok(report)
    }

    /// Check the local store and rebuild it if needed.
    ///
    /// Returns the rebuild report when a rebuild ran. A rebuild that pulled
    /// only part of the remote data is an error.
    pub async fn ensure_healthy(&self) -> Result<Option<RebuildReport>> {
        let report = self.check_health().await;
        if !report.needs_rebuild {
            tracing::info!(
                "Local store healthy: {} tables, {} records",
                report.table_count,
                report.record_count
            );
            return Ok(None);
        }

        tracing::warn!(
            exists = report.exists,
            tables = report.table_count,
            "Local store needs rebuild"
        );
        let rebuild = self.rebuild().await?;
        if !rebuild.success {
            return Err(Error::RebuildFailed(rebuild.errors.join("; ")));
        }
        Ok(Some(rebuild))
    }
}
