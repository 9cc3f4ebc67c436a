use std::path::PathBuf;

use crate::commands::common::open_engine;
use crate::error::CliError;

pub async fn run_health(as_json: bool, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let engine = open_engine(data_dir).await?;
    let report = engine.check_health().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let verdict = if report.valid {
            "valid"
        } else if report.exists {
            "invalid (rebuild needed)"
        } else {
            "missing (rebuild needed)"
        };
        println!("Local store: {verdict}");
        println!("Tables: {}", report.table_count);
        println!("Records: {}", report.record_count);
    }

    engine.shutdown().await;
    Ok(())
}
