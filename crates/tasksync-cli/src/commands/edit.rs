use crate::commands::common::{open_task_list, resolve_task_id, resolve_task_text, CliContext};
use crate::error::CliError;

pub async fn run_edit(context: &CliContext, id: &str, text_parts: &[String]) -> Result<(), CliError> {
    let tasks = open_task_list(context)?;
    let id = resolve_task_id(&tasks, id).await?;
    let text = resolve_task_text(text_parts)?;

    let current = tasks.get(&id).await?;
    if current.text == text {
        println!("{}", current.id);
        return Ok(());
    }

    let updated = tasks.edit_text(&id, &text).await?;
    println!("{}", updated.id);
    Ok(())
}
