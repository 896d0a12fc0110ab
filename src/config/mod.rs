//! Configuration management for composer-audio.
//!
//! Settings are read from a TOML file in the user's config directory. Forum
//! credentials are kept apart, with restricted permissions, in the user's
//! local data directory.

pub mod file;
pub mod secrets;

pub use file::{config_path, set_site_url, ComposerAudioConfig, UploadConfig};
pub use secrets::{clear_credentials, load_credentials, save_credentials, stored_credentials, Credentials};
