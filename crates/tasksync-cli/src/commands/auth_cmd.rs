use tasksync_core::auth::TokenPersistence;
use tasksync_core::remote::GistClient;

use crate::auth::KeyringTokenStore;
use crate::cli::AuthCommands;
use crate::commands::common::{env_token, normalize_text, token_source, CliContext, TokenSource};
use crate::error::CliError;

pub async fn run_auth(context: &CliContext, command: AuthCommands) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { token } => {
            let (profile_name, login) = run_auth_login(context, &token).await?;
            if let Some(login) = login {
                println!("Token accepted for GitHub user {login}");
            }
            println!("Stored token for profile '{profile_name}'");
            Ok(())
        }
        AuthCommands::Status => {
            let config = context.load_config()?;
            let profile_name = context.profile_name(&config);
            match token_source(&profile_name, env_token().as_deref())? {
                Some(TokenSource::Environment) => println!(
                    "Profile '{profile_name}' uses the token from {}",
                    TokenSource::Environment.label()
                ),
                Some(TokenSource::Keychain) => {
                    println!("Profile '{profile_name}' has a stored token");
                }
                None => println!("Profile '{profile_name}' is not signed in."),
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let profile_name = run_auth_logout(context)?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}

/// Validate (when enabled) and store `token`. Returns the profile name and
/// the GitHub login the token belongs to, if it was checked.
pub async fn run_auth_login(
    context: &CliContext,
    token: &str,
) -> Result<(String, Option<String>), CliError> {
    let (profile_name, settings) = context.settings()?;
    let token =
        normalize_text(token).ok_or_else(|| CliError::Auth("token must not be empty".into()))?;

    let login = if settings.validate_token {
        let client = GistClient::new(settings.api_base_url.clone(), settings.request_timeout())?;
        let login = client
            .current_user(&token)
            .await
            .map_err(|error| CliError::Auth(error.to_string()))?;
        Some(login)
    } else {
        None
    };

    KeyringTokenStore::new(&profile_name).save_token(&token)?;
    Ok((profile_name, login))
}

pub fn run_auth_logout(context: &CliContext) -> Result<String, CliError> {
    let config = context.load_config()?;
    let profile_name = context.profile_name(&config);
    KeyringTokenStore::new(&profile_name).clear_token()?;
    Ok(profile_name)
}
