//! Preview playback through an external audio player.
//!
//! Preparing a handle writes the artifact to a temporary file; starting it
//! spawns the first player that is installed. The child is polled rather than
//! waited on so the modal stays responsive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{anyhow, Result};

use super::ffmpeg::find_binary;
use super::{PlaybackPort, PlaybackStatus};
use crate::session::{PlaybackHandle, RecordingArtifact};

/// Players tried in order, with the flags that make them exit when done and
/// stay quiet on the terminal.
#[cfg(target_os = "macos")]
const PLAYERS: &[(&str, &[&str])] = &[
    ("afplay", &[]),
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
];

#[cfg(not(target_os = "macos"))]
const PLAYERS: &[(&str, &[&str])] = &[
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
    ("mpv", &["--no-video", "--really-quiet"]),
    ("mpg123", &["-q"]),
    ("paplay", &[]),
];

pub struct ProcessPlayback {
    dir: PathBuf,
    files: HashMap<PlaybackHandle, PathBuf>,
    current: Option<(PlaybackHandle, Child)>,
}

impl ProcessPlayback {
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir())
    }

    /// Stores preview files in `dir` instead of the system temp directory.
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            files: HashMap::new(),
            current: None,
        }
    }

    fn preview_path(&self, handle: PlaybackHandle, artifact: &RecordingArtifact) -> PathBuf {
        let extension = Path::new(artifact.file_name())
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("audio");
        self.dir.join(format!(
            "composer-audio-{}-{}.{}",
            std::process::id(),
            handle.0,
            extension
        ))
    }

    fn kill_current(&mut self) {
        if let Some((handle, mut child)) = self.current.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!("Playback {} stopped", handle.0);
        }
    }
}

impl Default for ProcessPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackPort for ProcessPlayback {
    fn prepare(&mut self, handle: PlaybackHandle, artifact: &RecordingArtifact) -> Result<()> {
        let path = self.preview_path(handle, artifact);
        std::fs::write(&path, artifact.bytes())
            .map_err(|e| anyhow!("Failed to write preview file {}: {e}", path.display()))?;
        tracing::debug!("Preview {} written to {}", handle.0, path.display());
        self.files.insert(handle, path);
        Ok(())
    }

    fn start(&mut self, handle: PlaybackHandle) -> Result<()> {
        let path = self
            .files
            .get(&handle)
            .cloned()
            .ok_or_else(|| anyhow!("No preview prepared for handle {}", handle.0))?;
        self.kill_current();
        let child = spawn_player(&path)?;
        self.current = Some((handle, child));
        Ok(())
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        if self.current.as_ref().is_some_and(|(h, _)| *h == handle) {
            self.kill_current();
        }
    }

    fn release(&mut self, handle: PlaybackHandle) {
        self.stop(handle);
        if let Some(path) = self.files.remove(&handle) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!("Failed to remove preview file {}: {}", path.display(), e);
            }
        }
    }

    fn poll(&mut self) -> Option<PlaybackStatus> {
        let (handle, child) = self.current.as_mut()?;
        let handle = *handle;
        let status = match child.try_wait() {
            Ok(None) => return None,
            Ok(Some(status)) if status.success() => PlaybackStatus::Ended(handle),
            Ok(Some(status)) => {
                PlaybackStatus::Failed(handle, format!("player exited with {status}"))
            }
            Err(e) => PlaybackStatus::Failed(handle, e.to_string()),
        };
        self.current = None;
        Some(status)
    }
}

impl Drop for ProcessPlayback {
    fn drop(&mut self) {
        self.kill_current();
        for (_, path) in self.files.drain() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn spawn_player(path: &Path) -> Result<Child> {
    for (name, flags) in PLAYERS {
        let Some(binary) = find_binary(name) else {
            continue;
        };
        match Command::new(&binary)
            .args(*flags)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                tracing::info!("Playing {} with {}", path.display(), name);
                return Ok(child);
            }
            Err(e) => tracing::debug!("Failed to start {}: {}", name, e),
        }
    }

    let names: Vec<&str> = PLAYERS.iter().map(|(name, _)| *name).collect();
    Err(anyhow!("No audio player found. Install one of: {}", names.join(", ")))
}
