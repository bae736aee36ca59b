use crate::commands::common::{open_task_list, resolve_task_id, CliContext};
use crate::error::CliError;

/// Mark a task done (`completed = true`) or open again
pub async fn run_done(context: &CliContext, id: &str, completed: bool) -> Result<(), CliError> {
    let tasks = open_task_list(context)?;
    let id = resolve_task_id(&tasks, id).await?;
    let task = tasks.set_completed(&id, completed).await?;
    println!("{}", task.id);
    Ok(())
}
