//! First-run setup.
//!
//! Writes the default config file, stamped with the running version, when it
//! is missing or was written by an older release.

pub mod version;

use anyhow::anyhow;
use std::path::Path;

use crate::config;

/// Embedded default configuration template.
const DEFAULT_CONFIG: &str = include_str!("../../environments/composer-audio.toml");

/// Current application version from Cargo.toml
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs setup when needed and stamps the config with the current version.
pub fn ensure_config() -> anyhow::Result<()> {
    let config_path = config::config_path()?;

    match version::check_setup_needed(&config_path)? {
        version::SetupStatus::Current => {
            tracing::debug!("Config version up to date ({})", CURRENT_VERSION);
        }
        version::SetupStatus::Missing => {
            tracing::info!("No config found, writing defaults to {}", config_path.display());
            write_default_config(&config_path)?;
        }
        version::SetupStatus::Outdated(old_version) => {
            tracing::info!(
                "Setup needed - migrating from version {} to {}",
                old_version,
                CURRENT_VERSION
            );
            version::update_config_version(&config_path)
                .map_err(|e| anyhow!("Failed to update config version: {e}"))?;
        }
    }
    Ok(())
}

/// Writes the template with a version line prepended.
fn write_default_config(config_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let full_config = format!(
        "config_version = \"{}\"\n{}",
        CURRENT_VERSION, DEFAULT_CONFIG
    );
    std::fs::write(config_path, full_config)?;
    Ok(())
}
