use tasksync_core::models::today;
use tasksync_core::TaskRecord;

use crate::commands::common::{format_task_lines, open_task_list, CliContext};
use crate::error::CliError;

pub async fn run_list(
    context: &CliContext,
    date: Option<&str>,
    all: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let tasks = list_tasks(context, date, all).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for line in format_task_lines(&tasks, all) {
        println!("{line}");
    }
    Ok(())
}

pub async fn list_tasks(
    context: &CliContext,
    date: Option<&str>,
    all: bool,
) -> Result<Vec<TaskRecord>, CliError> {
    let tasks = open_task_list(context)?;
    if all {
        return Ok(tasks.list().await?);
    }
    let date = date.map_or_else(today, ToString::to_string);
    Ok(tasks.list_for_date(&date).await?)
}
