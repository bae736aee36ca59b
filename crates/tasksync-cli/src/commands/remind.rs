use crate::commands::common::{open_task_list, resolve_task_id, CliContext};
use crate::error::CliError;

pub async fn run_remind(
    context: &CliContext,
    id: &str,
    time: Option<&str>,
    clear: bool,
) -> Result<(), CliError> {
    let tasks = open_task_list(context)?;
    let id = resolve_task_id(&tasks, id).await?;
    let reminder = if clear { None } else { time };
    let task = tasks.set_reminder(&id, reminder).await?;

    match &task.reminder {
        Some(reminder) => println!("{} @{reminder}", task.id),
        None => println!("{}", task.id),
    }
    Ok(())
}
