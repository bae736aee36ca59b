use crate::commands::common::{open_task_list, resolve_task_id, CliContext};
use crate::error::CliError;

pub async fn run_delete(context: &CliContext, id: &str) -> Result<(), CliError> {
    let tasks = open_task_list(context)?;
    let id = resolve_task_id(&tasks, id).await?;
    let task = tasks.delete(&id).await?;
    println!("{}", task.id);
    Ok(())
}
