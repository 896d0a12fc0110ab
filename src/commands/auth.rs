//! Forum authentication.
//!
//! Asks for the forum URL, the username and a user API key. Pressing Enter
//! keeps the current value of each.

use cliclack::{confirm, input, intro, note, outro, password};
use console::style;

use crate::config::{self, ComposerAudioConfig, Credentials};

/// Interactive setup of the forum URL and API credentials.
pub async fn handle_auth() -> Result<(), anyhow::Error> {
    tracing::info!("=== composer-audio Authentication ===");

    ctrlc::set_handler(move || {})
        .map_err(|e| anyhow::anyhow!("Failed to set Ctrl-C handler: {e}"))?;

    intro(style(" auth ").on_white().black())?;

    let config_path = config::config_path()?;
    let current_config = ComposerAudioConfig::load_from(&config_path).unwrap_or_default();
    let current = config::stored_credentials().ok().flatten();

    if let Some(current) = &current {
        note(
            "current login",
            format!("{} on {}", current.api_username, current_config.upload.site_url),
        )?;
    }

    let current_url = current_config.upload.site_url.clone();
    let mut url_prompt = input("Forum URL:").placeholder("https://forum.example.com");
    if !current_url.is_empty() {
        url_prompt = url_prompt.default_input(&current_url);
    }
    let site_url: String = url_prompt
        .validate(|value: &String| {
            if value.starts_with("https://") || value.starts_with("http://") {
                Ok(())
            } else {
                Err("The URL must start with https:// or http://")
            }
        })
        .interact()
        .map_err(|e| anyhow::anyhow!("URL input cancelled: {e}"))?;

    let mut user_prompt = input("Username:");
    if let Some(current) = &current {
        user_prompt = user_prompt.default_input(&current.api_username);
    }
    let api_username: String = user_prompt
        .interact()
        .map_err(|e| anyhow::anyhow!("Username input cancelled: {e}"))?;

    let api_key = match &current {
        Some(current) => {
            let entered = password("API key (press Enter to keep current):")
                .allow_empty()
                .interact()
                .map_err(|e| anyhow::anyhow!("API key input cancelled: {e}"))?;
            if entered.is_empty() {
                current.api_key.clone()
            } else {
                entered
            }
        }
        None => password("API key:")
            .interact()
            .map_err(|e| anyhow::anyhow!("API key input cancelled: {e}"))?,
    };

    if api_key.trim().is_empty() {
        return Err(anyhow::anyhow!("API key cannot be empty"));
    }

    config::set_site_url(&config_path, site_url.trim_end_matches('/'))?;
    config::save_credentials(&Credentials {
        api_username: api_username.trim().to_string(),
        api_key: api_key.trim().to_string(),
    })?;

    outro("✅ Credentials saved.")?;
    tracing::info!("Authentication completed for {}", api_username.trim());
    Ok(())
}

/// Removes stored credentials after confirmation.
pub async fn handle_logout() -> Result<(), anyhow::Error> {
    ctrlc::set_handler(move || {})
        .map_err(|e| anyhow::anyhow!("Failed to set Ctrl-C handler: {e}"))?;

    intro(style(" logout ").on_white().black())?;
    let confirmed = confirm("Remove the stored API key?")
        .initial_value(false)
        .interact()?;
    if confirmed {
        config::clear_credentials()?;
        outro("Credentials removed.")?;
    } else {
        outro("Nothing changed.")?;
    }
    Ok(())
}
