//! Locating external binaries.
//!
//! Terminal launchers often start us with a minimal PATH, so well-known install
//! locations are checked before asking `which`/`where`.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Locates the ffmpeg binary used for encoding.
pub fn find_ffmpeg() -> Result<PathBuf> {
    find_binary("ffmpeg").ok_or_else(|| {
        anyhow!(
            "ffmpeg not found. Please install ffmpeg:\n\
             macOS: brew install ffmpeg\n\
             Linux: apt install ffmpeg (Debian/Ubuntu) or dnf install ffmpeg (Fedora)\n\
             Windows: Download from https://ffmpeg.org/download.html\n\
             Or set audio.output_format to \"pcm_s16le\" to record WAV without ffmpeg."
        )
    })
}

/// Looks for `name` in the platform's usual install directories, then in PATH.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let found = install_dirs()
        .iter()
        .map(|dir| PathBuf::from(dir).join(executable_name(name)))
        .find(|path| path.exists())
        .or_else(|| find_in_path(name));

    if let Some(path) = &found {
        tracing::debug!("Found {} at: {}", name, path.display());
    }
    found
}

fn install_dirs() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"]
    } else if cfg!(target_os = "linux") {
        &["/usr/bin", "/usr/local/bin", "/snap/bin"]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin",
            "C:\\Program Files\\ffmpeg\\bin",
            "C:\\Program Files (x86)\\ffmpeg\\bin",
        ]
    } else {
        &[]
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Asks `which` (or `where` on Windows) for `binary_name`.
fn find_in_path(binary_name: &str) -> Option<PathBuf> {
    let search_cmd = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    let output = std::process::Command::new(search_cmd)
        .arg(binary_name)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next()?.trim();
    (!first.is_empty()).then(|| PathBuf::from(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_none() {
        assert_eq!(find_binary("composer-audio-no-such-binary"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_finds_shell() {
        let sh = find_binary("sh").expect("sh is always installed");
        assert!(sh.ends_with("sh"));
    }
}
