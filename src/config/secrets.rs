//! Forum credentials storage.
//!
//! Credentials live in `~/.local/share/composer-audio/credentials.toml`,
//! readable only by the owner. The environment variables
//! `COMPOSER_AUDIO_API_KEY` and `COMPOSER_AUDIO_API_USERNAME` override the
//! stored values field by field.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const API_KEY_ENV: &str = "COMPOSER_AUDIO_API_KEY";
const API_USERNAME_ENV: &str = "COMPOSER_AUDIO_API_USERNAME";

/// A Discourse user API key and the user it acts as.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_username: String,
    pub api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_username", &self.api_username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

fn credentials_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home
        .join(".local")
        .join("share")
        .join("composer-audio")
        .join("credentials.toml"))
}

/// Returns the effective credentials, or `None` if no complete pair is known.
pub fn load_credentials() -> anyhow::Result<Option<Credentials>> {
    let stored = load_credentials_from(&credentials_path()?)?;
    Ok(with_env_overrides(
        stored,
        std::env::var(API_USERNAME_ENV).ok(),
        std::env::var(API_KEY_ENV).ok(),
    ))
}

/// Stored credentials only, ignoring the environment.
pub fn stored_credentials() -> anyhow::Result<Option<Credentials>> {
    load_credentials_from(&credentials_path()?)
}

pub fn save_credentials(credentials: &Credentials) -> anyhow::Result<()> {
    save_credentials_to(&credentials_path()?, credentials)?;
    tracing::info!("Credentials saved for {}", credentials.api_username);
    Ok(())
}

/// Removes stored credentials. Missing files are not an error.
pub fn clear_credentials() -> anyhow::Result<()> {
    let path = credentials_path()?;
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::info!("Credentials removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::anyhow!("Failed to remove {}: {e}", path.display())),
    }
}

fn load_credentials_from(path: &Path) -> anyhow::Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let credentials: Credentials = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid credentials file {}: {e}", path.display()))?;
    Ok(Some(credentials))
}

fn save_credentials_to(path: &Path, credentials: &Credentials) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string(credentials)?)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn with_env_overrides(
    stored: Option<Credentials>,
    env_username: Option<String>,
    env_key: Option<String>,
) -> Option<Credentials> {
    let (stored_username, stored_key) = match stored {
        Some(c) => (Some(c.api_username), Some(c.api_key)),
        None => (None, None),
    };
    let api_username = env_username.filter(|v| !v.is_empty()).or(stored_username)?;
    let api_key = env_key.filter(|v| !v.is_empty()).or(stored_key)?;
    Some(Credentials {
        api_username,
        api_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Credentials {
        Credentials {
            api_username: "alice".to_string(),
            api_key: "k1".to_string(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.toml");
        assert_eq!(load_credentials_from(&path).unwrap(), None);

        save_credentials_to(&path, &alice()).unwrap();
        assert_eq!(load_credentials_from(&path).unwrap(), Some(alice()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_env_overrides() {
        assert_eq!(with_env_overrides(None, None, None), None);
        assert_eq!(with_env_overrides(None, Some("bob".into()), None), None);

        let both = with_env_overrides(None, Some("bob".into()), Some("k2".into())).unwrap();
        assert_eq!(both.api_username, "bob");

        let key_only = with_env_overrides(Some(alice()), None, Some("k2".into())).unwrap();
        assert_eq!(key_only.api_username, "alice");
        assert_eq!(key_only.api_key, "k2");

        let empty = with_env_overrides(Some(alice()), Some(String::new()), None).unwrap();
        assert_eq!(empty, alice());
    }

    #[test]
    fn test_debug_redacts_key() {
        let printed = format!("{:?}", alice());
        assert!(printed.contains("alice"));
        assert!(!printed.contains("k1"));
    }
}
