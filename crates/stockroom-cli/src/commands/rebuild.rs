use std::path::PathBuf;

use crate::commands::common::{finish_operation, open_engine};
use crate::error::CliError;

pub async fn run_rebuild(data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let engine = open_engine(data_dir).await?;
    let result = engine.rebuild().await;
    engine.shutdown().await;
    let report = result?;

    println!(
        "Rebuild {}: {} tables created, {} records pulled",
        if report.success { "completed" } else { "incomplete" },
        report.tables_rebuilt,
        report.records_synced
    );
    finish_operation("Rebuild", &report.errors)
}
