use std::sync::Arc;
use std::time::Duration;

use tasksync_core::{SyncEvent, SyncScheduler, SyncState, TaskList};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{build_engine, format_sync_time, open_store, CliContext};
use crate::commands::due::fire_due_reminders;
use crate::error::CliError;

const REMINDER_CHECK_INTERVAL: Duration = Duration::from_secs(20);
/// How often edits made by other `tasksync` processes are picked up
const EXTERNAL_CHANGE_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run_watch(context: &CliContext) -> Result<(), CliError> {
    let store = open_store(&context.db_path)?;
    let engine = Arc::new(build_engine(context, store.clone())?);
    let interval = engine.settings().periodic_interval();
    let scheduler = SyncScheduler::new(Arc::clone(&engine));
    let tasks = TaskList::new(store.clone());
    let mut events = engine.subscribe();

    scheduler.attach();
    let external_changes = store.watch_external_changes(EXTERNAL_CHANGE_POLL_INTERVAL);
    scheduler.start_periodic(interval);
    if let Err(error) = scheduler.run_sync().await {
        tracing::debug!("Initial sync failed: {error}");
    }

    println!(
        "Watching tasks, syncing every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );

    let mut reminders = tokio::time::interval(REMINDER_CHECK_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {skipped} sync events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = reminders.tick() => {
                if let Err(error) = fire_due_reminders(&tasks, None, None).await {
                    tracing::warn!("Reminder check failed: {error}");
                }
            }
        }
    }

    scheduler.stop();
    if let Some(handle) = external_changes {
        handle.abort();
    }
    println!("Stopped watching.");
    Ok(())
}

fn print_event(event: &SyncEvent) {
    println!("{}", describe_event(event));
}

pub fn describe_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::RecordsUpdated(records) => {
            format!("Local tasks updated ({} tasks)", records.len())
        }
        SyncEvent::Status(status) => {
            let state = SyncState::from_status(status);
            let mut line = format!(
                "[{}] {}",
                state.label(),
                format_sync_time(status.last_sync_time)
            );
            if let Some(error) = &status.error {
                line.push_str(": ");
                line.push_str(error);
            }
            line
        }
    }
}
