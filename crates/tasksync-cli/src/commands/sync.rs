use tasksync_core::SyncReport;

use crate::commands::common::{build_engine, open_store, short_id, CliContext};
use crate::error::CliError;

pub async fn run_sync(context: &CliContext) -> Result<(), CliError> {
    let report = sync_once(context).await?;

    if report.created_document {
        println!("Created remote backup document");
    }
    for conflict in &report.conflicts {
        println!(
            "Conflict on {}: kept {:?} copy",
            short_id(&conflict.id),
            conflict.winner()
        );
    }
    println!(
        "Synced {} tasks (remote version {} -> {})",
        report.records.len(),
        report.remote_version,
        report.written_version
    );
    Ok(())
}

pub async fn sync_once(context: &CliContext) -> Result<SyncReport, CliError> {
    let store = open_store(&context.db_path)?;
    let engine = build_engine(context, store)?;
    Ok(engine.sync().await?)
}
