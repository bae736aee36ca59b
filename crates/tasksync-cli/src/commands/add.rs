use tasksync_core::models::today;
use tasksync_core::TaskRecord;

use crate::commands::common::{open_task_list, resolve_task_text, CliContext};
use crate::error::CliError;

pub async fn run_add(
    context: &CliContext,
    text_parts: &[String],
    date: Option<&str>,
) -> Result<(), CliError> {
    let task = add_task(context, text_parts, date).await?;
    println!("{}", task.id);
    Ok(())
}

pub async fn add_task(
    context: &CliContext,
    text_parts: &[String],
    date: Option<&str>,
) -> Result<TaskRecord, CliError> {
    let text = resolve_task_text(text_parts)?;
    let date = date.map_or_else(today, ToString::to_string);
    let tasks = open_task_list(context)?;
    Ok(tasks.add(&text, &date).await?)
}
