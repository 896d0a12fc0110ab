//! Application command handlers for composer-audio.
//!
//! # Commands
//! - `record`: Record, preview and upload a voice note (default)
//! - `auth` / `logout`: Forum URL and API key management
//! - `config`: Open configuration file in user's preferred editor
//! - `list_devices`: List available audio input devices
//! - `logs`: Display recent log entries

pub mod auth;
pub mod config;
pub mod list_devices;
pub mod logs;
pub mod record;

pub use auth::{handle_auth, handle_logout};
pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use record::handle_record;
