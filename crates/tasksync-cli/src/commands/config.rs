use serde::Serialize;
use tasksync_core::config::SyncSettings;
use tasksync_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::commands::common::CliContext;
use crate::error::CliError;

/// Values given to `config init`; `None` keeps the stored value
#[derive(Debug, Default)]
pub struct ConfigInitOptions {
    pub api_base_url: Option<String>,
    pub debounce_ms: Option<u64>,
    pub interval_secs: Option<u64>,
    pub no_validate_token: bool,
    pub no_activate: bool,
}

#[derive(Debug, Serialize)]
struct ProfileView<'a> {
    profile: &'a str,
    config_path: String,
    settings: &'a SyncSettings,
}

pub fn run_config(context: &CliContext, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            debounce_ms,
            interval_secs,
            no_validate_token,
            no_activate,
        } => {
            let profile_name = run_config_init(
                context,
                ConfigInitOptions {
                    api_base_url,
                    debounce_ms,
                    interval_secs,
                    no_validate_token,
                    no_activate,
                },
            )?;
            println!(
                "Profile '{}' initialized at {}",
                profile_name,
                context.config_path.display()
            );
            println!(
                "Run `tasksync auth login --token <TOKEN>` with a GitHub token that has the gist scope."
            );
            Ok(())
        }
        ConfigCommands::Show => run_config_show(context),
    }
}

/// Create or update the selected profile and return its name
pub fn run_config_init(
    context: &CliContext,
    options: ConfigInitOptions,
) -> Result<String, CliError> {
    let mut config = context.load_config()?;
    let profile_name = context.profile_name(&config);

    let settings = &mut config.profile_mut_or_default(&profile_name).settings;
    if let Some(url) = normalize_text_option(options.api_base_url) {
        settings.api_base_url = url;
    }
    if let Some(debounce_ms) = options.debounce_ms {
        settings.debounce_ms = debounce_ms;
    }
    if let Some(interval_secs) = options.interval_secs {
        settings.periodic_interval_secs = interval_secs;
    }
    if options.no_validate_token {
        settings.validate_token = false;
    }
    settings.validate()?;

    if !options.no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    config
        .save_to_path(&context.config_path)
        .map_err(CliError::Config)?;
    Ok(profile_name)
}

fn run_config_show(context: &CliContext) -> Result<(), CliError> {
    let (profile_name, settings) = context.settings()?;
    let view = ProfileView {
        profile: &profile_name,
        config_path: context.config_path.display().to_string(),
        settings: &settings,
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
