use std::path::PathBuf;

use crate::cli::SyncDirection;
use crate::commands::common::{finish_operation, format_result_line, open_engine};
use crate::error::CliError;

pub async fn run_sync(direction: SyncDirection, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let engine = open_engine(data_dir).await?;
    let results = match direction {
        SyncDirection::Push => vec![("push", engine.push_all().await)],
        SyncDirection::Pull => vec![("pull", engine.pull_all().await)],
        SyncDirection::Both => {
            let result = engine.bidirectional_sync().await;
            vec![("push", result.push), ("pull", result.pull)]
        }
    };
    engine.shutdown().await;

    if results.iter().any(|(_, result)| result.skipped) {
        return Err(CliError::Busy("Sync"));
    }

    let mut errors = Vec::new();
    for (label, result) in results {
        println!("{}", format_result_line(label, &result));
        errors.extend(result.errors);
    }
    finish_operation("Sync", &errors)
}
