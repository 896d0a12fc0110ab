//! Configuration file management for composer-audio.
//!
//! The config lives at `~/.config/composer-audio/composer-audio.toml` and is
//! created from the embedded template on first run. Edits made by the app
//! itself are line-level so user comments survive.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Audio capture and encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `composer-audio list-devices`
    /// - device name from `composer-audio list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Preferred sample rate in Hz. The device's native rate is used when it differs.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Output audio format string: "codec [ffmpeg_options]" (e.g., "mp3 -ab 64k")
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_output_format() -> String {
    "mp3 -ab 64k".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            output_format: default_output_format(),
        }
    }
}

/// Recording session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettings {
    /// Uploaded file name without extension
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Seconds to wait for microphone access before giving up; 0 waits forever
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Show "Starting recorder..." until the encoder reports it is running
    #[serde(default = "default_true")]
    pub await_recorder_start: bool,
}

fn default_file_name() -> String {
    "recording".to_string()
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            await_recorder_start: true,
        }
    }
}

impl SessionSettings {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        (self.acquire_timeout_secs > 0).then(|| Duration::from_secs(self.acquire_timeout_secs))
    }
}

/// Forum upload target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    /// Base URL of the Discourse site, e.g. "https://forum.example.com"
    #[serde(default)]
    pub site_url: String,
    /// Upload type sent with the file ("composer" for post attachments)
    #[serde(default = "default_upload_type")]
    pub upload_type: String,
}

fn default_upload_type() -> String {
    "composer".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            upload_type: default_upload_type(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposerAudioConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub upload: UploadConfig,
    /// Display string overrides keyed by text id, e.g. "composer_audio.title"
    #[serde(default)]
    pub text: HashMap<String, String>,
}

impl ComposerAudioConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read
    /// - If the TOML is malformed or fails validation
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ComposerAudioConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let name = self.session.file_name.trim();
        if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') {
            return Err(anyhow::anyhow!(
                "session.file_name must be a plain file name without extension, got '{}'",
                self.session.file_name
            ));
        }
        if self.audio.output_format.trim().is_empty() {
            return Err(anyhow::anyhow!("audio.output_format must not be empty"));
        }
        Ok(())
    }
}

/// Directory holding the config file.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".config").join("composer-audio"))
}

/// Path of the config file. It may not exist yet; setup creates it.
pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("composer-audio.toml"))
}

/// Sets `upload.site_url` in the config file, keeping everything else as written.
pub fn set_site_url(path: &Path, site_url: &str) -> anyhow::Result<()> {
    let content = fs::read_to_string(path)?;
    let value_line = format!("site_url = {}", toml::Value::String(site_url.to_string()));

    let key = Regex::new(r"(?m)^[ \t]*site_url[ \t]*=.*$")?;
    let updated = if key.is_match(&content) {
        key.replace(&content, regex::NoExpand(&value_line)).into_owned()
    } else {
        let section = Regex::new(r"(?m)^[ \t]*\[upload\][ \t]*$")?;
        match section.find(&content) {
            Some(header) => format!(
                "{}\n{}{}",
                &content[..header.end()],
                value_line,
                &content[header.end()..]
            ),
            None => format!("{}\n[upload]\n{}\n", content.trim_end(), value_line),
        }
    };

    fs::write(path, updated)?;
    tracing::info!("Site URL set to {}", site_url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_sections() {
        let config = ComposerAudioConfig::parse(r#"config_version = "0.1.0""#).unwrap();
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.session.file_name, "recording");
        assert_eq!(config.session.acquire_timeout(), Some(Duration::from_secs(30)));
        assert!(config.session.await_recorder_start);
        assert_eq!(config.upload.upload_type, "composer");
        assert!(config.text.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = ComposerAudioConfig::parse(
            r#"
            config_version = "0.1.0"

            [audio]
            device = "1"
            sample_rate = 48000
            output_format = "libopus -b:a 32k"

            [session]
            file_name = "voice-note"
            acquire_timeout_secs = 0
            await_recorder_start = false

            [upload]
            site_url = "https://forum.example.com"

            [text]
            "composer_audio.title" = "Sprachnachricht"
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.device, "1");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.session.acquire_timeout(), None);
        assert!(!config.session.await_recorder_start);
        assert_eq!(config.upload.site_url, "https://forum.example.com");
        assert_eq!(
            config.text.get("composer_audio.title").map(String::as_str),
            Some("Sprachnachricht")
        );
    }

    #[test]
    fn test_rejects_path_in_file_name() {
        let err = ComposerAudioConfig::parse("[session]\nfile_name = \"../etc/x\"").unwrap_err();
        assert!(err.to_string().contains("session.file_name"));
    }

    #[test]
    fn test_bundled_template_parses() {
        let template = include_str!("../../environments/composer-audio.toml");
        let config = ComposerAudioConfig::parse(template).unwrap();
        assert_eq!(config.audio.output_format, "mp3 -ab 64k");
    }

    #[test]
    fn test_set_site_url_replaces_existing_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composer-audio.toml");
        fs::write(
            &path,
            "config_version = \"0.1.0\"\n# forum\n[upload]\nsite_url = \"\"\nupload_type = \"composer\"\n",
        )
        .unwrap();

        set_site_url(&path, "https://meta.example.org").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("# forum"));
        assert!(content.contains("site_url = \"https://meta.example.org\""));
        let config = ComposerAudioConfig::load_from(&path).unwrap();
        assert_eq!(config.upload.site_url, "https://meta.example.org");
        assert_eq!(config.upload.upload_type, "composer");
    }

    #[test]
    fn test_set_site_url_adds_missing_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composer-audio.toml");
        fs::write(&path, "config_version = \"0.1.0\"\n[audio]\ndevice = \"default\"\n").unwrap();

        set_site_url(&path, "https://forum.example.com").unwrap();

        let config = ComposerAudioConfig::load_from(&path).unwrap();
        assert_eq!(config.upload.site_url, "https://forum.example.com");
        assert_eq!(config.audio.device, "default");
    }
}
