use std::path::PathBuf;

use crate::commands::common::{finish_operation, open_engine};
use crate::error::CliError;

pub async fn run_watch(data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let engine = open_engine(data_dir).await?;
    if engine.is_direct() {
        println!("Direct remote mode: nothing to watch");
        return Ok(());
    }

    if let Some(report) = engine.start().await? {
        println!(
            "Local store rebuilt: {} tables created, {} records pulled",
            report.tables_rebuilt, report.records_synced
        );
        finish_operation("Rebuild", &report.errors)?;
    }
    println!(
        "Watching ({}); press Ctrl-C to stop",
        engine.status().await.connectivity
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received; shutting down");
    engine.shutdown().await;
    Ok(())
}
