use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tasksync")]
#[command(about = "Daily task list with GitHub Gist backup and multi-device sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the CLI profile config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// CLI profile name for sync configuration and credentials
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a task
    #[command(alias = "new")]
    Add {
        /// Task text
        text: Vec<String>,
        /// Day the task belongs to (YYYY-MM-DD, defaults to today)
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
    /// List tasks for a day
    List {
        /// Day to show (YYYY-MM-DD, defaults to today)
        #[arg(long, value_name = "DATE", conflicts_with = "all")]
        date: Option<String>,
        /// Show tasks of every day
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task as done
    Done {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Mark a task as not done
    Undo {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Replace the text of a task
    Edit {
        /// Task ID or unique ID prefix
        id: String,
        /// New task text (read from stdin when omitted)
        text: Vec<String>,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Set or clear a task reminder
    Remind {
        /// Task ID or unique ID prefix
        id: String,
        /// Reminder time of day (HH:MM)
        #[arg(value_name = "HH:MM", required_unless_present = "clear")]
        time: Option<String>,
        /// Remove the reminder
        #[arg(long, conflicts_with = "time")]
        clear: bool,
    },
    /// Fire reminders that are due now
    Due {
        /// Day to check (YYYY-MM-DD, defaults to today)
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
        /// Time to check (HH:MM, defaults to now)
        #[arg(long, value_name = "HH:MM")]
        time: Option<String>,
    },
    /// Sync local tasks with the remote backup
    Sync,
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the background and fire reminders until Ctrl-C
    Watch,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the GitHub access token of a profile
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Remote API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Quiet period after an edit before syncing, in milliseconds
        #[arg(long, value_name = "MS")]
        debounce_ms: Option<u64>,
        /// Background sync period, in seconds
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
        /// Skip checking stored tokens with the remote before use
        #[arg(long)]
        no_validate_token: bool,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the effective settings of a profile
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a GitHub personal access token (gist scope) in the keychain
    Login {
        /// Access token
        #[arg(long, value_name = "TOKEN")]
        token: String,
    },
    /// Show which token the profile uses
    Status,
    /// Remove the stored token
    Logout,
}
