//! tasksync CLI - daily task list with remote backup and multi-device sync
//!
//! Tasks live in a local SQLite store; `sync` and `watch` reconcile them
//! with a private GitHub Gist shared by every device.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::CliContext;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::done::run_done;
use crate::commands::due::run_due;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::remind::run_remind;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "tasksync=info"
        .parse::<Directive>()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CliContext::new(cli.db_path, cli.config_path, cli.profile);

    match cli.command {
        Commands::Add { text, date } => run_add(&context, &text, date.as_deref()).await?,
        Commands::List { date, all, json } => {
            run_list(&context, date.as_deref(), all, json).await?;
        }
        Commands::Done { id } => run_done(&context, &id, true).await?,
        Commands::Undo { id } => run_done(&context, &id, false).await?,
        Commands::Edit { id, text } => run_edit(&context, &id, &text).await?,
        Commands::Delete { id } => run_delete(&context, &id).await?,
        Commands::Remind { id, time, clear } => {
            run_remind(&context, &id, time.as_deref(), clear).await?;
        }
        Commands::Due { date, time } => {
            run_due(&context, date.as_deref(), time.as_deref()).await?;
        }
        Commands::Sync => run_sync(&context).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Watch => run_watch(&context).await?,
        Commands::Config { command } => run_config(&context, command)?,
        Commands::Auth { command } => run_auth(&context, command).await?,
    }

    Ok(())
}
