use serde::Serialize;
use tasksync_core::store::load_snapshot;

use crate::commands::common::{
    env_token, format_sync_time, open_store, token_source, CliContext, TokenSource,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub profile: String,
    pub db_path: String,
    pub token_source: Option<&'static str>,
    pub task_count: usize,
    pub open_task_count: usize,
    pub last_sync_version: Option<u64>,
    pub last_sync_time: Option<String>,
}

pub async fn run_status(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let report = collect_status(context, env_token().as_deref()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Profile:    {}", report.profile);
    println!("Database:   {}", report.db_path);
    println!(
        "Token:      {}",
        report.token_source.unwrap_or("not signed in")
    );
    println!(
        "Tasks:      {} ({} open)",
        report.task_count, report.open_task_count
    );
    match (report.last_sync_version, report.last_sync_time.as_deref()) {
        (Some(version), Some(time)) => println!("Last sync:  {time} (remote version {version})"),
        _ => println!("Last sync:  never"),
    }
    Ok(())
}

pub async fn collect_status(
    context: &CliContext,
    env_token: Option<&str>,
) -> Result<StatusReport, CliError> {
    let config = context.load_config()?;
    let profile = context.profile_name(&config);
    let source = token_source(&profile, env_token)?;

    let store = open_store(&context.db_path)?;
    let snapshot = load_snapshot(store.as_ref()).await?;

    Ok(StatusReport {
        token_source: source.map(TokenSource::label),
        profile,
        db_path: context.db_path.display().to_string(),
        task_count: snapshot.tasks.len(),
        open_task_count: snapshot.tasks.iter().filter(|task| !task.completed).count(),
        last_sync_version: snapshot.metadata.last_sync_version,
        last_sync_time: snapshot.metadata.last_sync_time.map(format_sync_time),
    })
}
