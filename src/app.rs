//! Application orchestration and command routing.

use crate::commands;
use crate::logging;
use crate::setup;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::process;

/// Record a voice note in the terminal and attach it to a forum post
#[derive(Parser)]
#[command(name = "composer-audio")]
#[command(version)]
#[command(about = "Record a voice note in the terminal and attach it to a forum post")]
#[command(long_about = "Record a voice note in the terminal, listen to it, and upload it to a\nDiscourse forum. The audio markup for the post is printed when the upload\nfinishes.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n    Record options (-c, -o) can be used without explicitly saying 'record'.\n\nKEYS:\n    r / Space      start or stop recording\n    p              play or stop the recording\n    Enter / u      upload\n    c / Backspace  discard the recording\n    Esc / q        close\n\nEXAMPLES:\n    # Record and print the markup\n    $ composer-audio\n\n    # Record and copy the markup to the clipboard\n    $ composer-audio -c\n\n    # Record and write the markup to a file\n    $ composer-audio record -o markup.txt\n\n    # Set the forum and API key\n    $ composer-audio auth")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/composer-audio/composer-audio.toml\n    Credentials:        ~/.local/share/composer-audio/credentials.toml\n    Logs:               ~/.local/state/composer-audio/composer-audio.log.*"
)]
struct Cli {
    /// Copy the markup to the clipboard instead of stdout (record default command)
    #[arg(short, long, global = true)]
    clipboard: bool,

    /// Write the markup to a file instead of stdout (record default command)
    #[arg(short, long, value_name = "FILE", global = true)]
    output: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record, preview and upload a voice note (default)
    ///
    /// SIGUSR1 toggles recording, for binding to a global hotkey.
    #[command(visible_alias = "r")]
    Record {
        /// Copy the markup to the clipboard instead of stdout
        #[arg(short, long)]
        clipboard: bool,

        /// Write the markup to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<String>,
    },

    /// Set the forum URL, username and API key
    #[command(visible_alias = "a")]
    Auth,

    /// Remove the stored API key
    Logout,

    /// Open configuration file in your preferred editor
    ///
    /// Uses $EDITOR environment variable or falls back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio input devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// the correct input device in composer-audio.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show the last 50 lines of the most recent log file
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   composer-audio completions bash > composer-audio.bash
    ///   composer-audio completions zsh > _composer-audio
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Chooses the record options: an explicit `record` subcommand wins over the
/// top-level flags.
fn record_options(cli: &Cli) -> (bool, Option<String>) {
    match &cli.command {
        Some(Commands::Record { clipboard, output }) => (
            *clipboard || cli.clipboard,
            output.clone().or_else(|| cli.output.clone()),
        ),
        _ => (cli.clipboard, cli.output.clone()),
    }
}

/// Runs the main application based on command-line arguments.
///
/// # Exit Codes
/// - 0: Success, or a prompt cancelled by the user
/// - 1: General error
/// - 2: Usage error (invalid arguments)
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that need neither logging nor a config file
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "composer-audio", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => return commands::handle_list_devices(),
        Some(Commands::Logs) => return commands::handle_logs(),
        _ => {}
    }

    logging::init_logging()?;
    setup::ensure_config().map_err(|e| {
        tracing::error!("Setup failed: {e}");
        anyhow::anyhow!("Setup failed: {e}")
    })?;

    match &cli.command {
        None | Some(Commands::Record { .. }) => {
            let (clipboard, output) = record_options(&cli);
            commands::handle_record(clipboard, output).await?;
        }
        Some(Commands::Auth) => exit_quietly_on_cancel(commands::handle_auth().await)?,
        Some(Commands::Logout) => exit_quietly_on_cancel(commands::handle_logout().await)?,
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}

/// cliclack has already told the user a prompt was cancelled.
fn exit_quietly_on_cancel(result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(e) = &result {
        let err_msg = e.to_string();
        if err_msg.contains("cancelled") || err_msg.contains("interrupted") {
            process::exit(0);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_takes_top_level_flags() {
        let cli = Cli::try_parse_from(["composer-audio", "-o", "out.txt"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(record_options(&cli), (false, Some("out.txt".to_string())));
    }

    #[test]
    fn test_record_subcommand_flags() {
        let cli = Cli::try_parse_from(["composer-audio", "record", "-c"]).unwrap();
        assert_eq!(record_options(&cli), (true, None));
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["composer-audio", "list-devices"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::ListDevices)));
        let cli = Cli::try_parse_from(["composer-audio", "completions", "zsh"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Completions { shell: Shell::Zsh })));
    }
}
