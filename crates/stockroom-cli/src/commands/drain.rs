use std::path::PathBuf;

use crate::commands::common::{finish_operation, format_result_line, open_engine};
use crate::error::CliError;

pub async fn run_drain(data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let engine = open_engine(data_dir).await?;
    let result = engine.drain_queue().await;
    engine.shutdown().await;

    if result.skipped {
        return Err(CliError::Busy("Drain"));
    }
    println!("{}", format_result_line("drain", &result));
    finish_operation("Drain", &result.errors)
}
