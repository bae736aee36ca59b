use tasksync_core::models::{current_time_of_day, today};
use tasksync_core::{TaskList, TaskRecord};

use crate::commands::common::{open_task_list, short_id, CliContext};
use crate::error::CliError;

pub async fn run_due(
    context: &CliContext,
    date: Option<&str>,
    time: Option<&str>,
) -> Result<(), CliError> {
    let tasks = open_task_list(context)?;
    let due = fire_due_reminders(&tasks, date, time).await?;
    if due.is_empty() {
        println!("No reminders due.");
    }
    Ok(())
}

/// Mark due reminders as fired and print one line per task
pub async fn fire_due_reminders(
    tasks: &TaskList,
    date: Option<&str>,
    time: Option<&str>,
) -> Result<Vec<TaskRecord>, CliError> {
    let date = date.map_or_else(today, ToString::to_string);
    let time = time.map_or_else(current_time_of_day, ToString::to_string);

    let due = tasks.mark_due_reminders(&date, &time).await?;
    for task in &due {
        println!("Reminder: {}  {}", short_id(&task.id), task.preview(60));
    }
    Ok(due)
}
