use std::path::PathBuf;

use crate::commands::common::{format_status_lines, now_millis, open_engine};
use crate::error::CliError;

pub async fn run_status(as_json: bool, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let engine = open_engine(data_dir).await?;
    engine.check_connectivity().await;
    let status = engine.status().await;
    engine.shutdown().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    for line in format_status_lines(&status, now_millis()) {
        println!("{line}");
    }
    Ok(())
}
