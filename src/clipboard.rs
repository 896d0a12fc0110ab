//! Clipboard access through the platform's command-line tools.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;

/// Clipboard tools tried in order, with their arguments.
#[cfg(target_os = "macos")]
const TOOLS: &[(&str, &[&str])] = &[("pbcopy", &[])];

#[cfg(not(target_os = "macos"))]
const TOOLS: &[(&str, &[&str])] = &[
    ("wl-copy", &["--type", "text/plain", "--trim-newline"]),
    ("xclip", &["-selection", "clipboard", "-in", "-quiet"]),
];

/// Copies `text` to the system clipboard and returns the tool that took it.
///
/// # Errors
/// - If none of pbcopy, wl-copy or xclip accepted the text
pub fn copy_to_clipboard(text: &str) -> anyhow::Result<&'static str> {
    for (tool, args) in TOOLS {
        let mut child = match Command::new(tool)
            .args(*args)
            .stdin(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(_) => {
                tracing::debug!("{} not found or not executable", tool);
                continue;
            }
        };

        let Some(mut stdin) = child.stdin.take() else {
            continue;
        };
        match write!(stdin, "{text}") {
            Ok(_) => {
                drop(stdin);
                // wl-copy and xclip fork to serve the selection; give them a moment
                thread::sleep(Duration::from_millis(100));
                tracing::debug!("Markup copied to clipboard via {}", tool);
                return Ok(*tool);
            }
            Err(e) => tracing::warn!("Failed to write to {} stdin: {}", tool, e),
        }
    }

    let names: Vec<&str> = TOOLS.iter().map(|(tool, _)| *tool).collect();
    Err(anyhow!("No clipboard tool available ({} not found)", names.join(" or ")))
}
