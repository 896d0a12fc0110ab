//! The recording session state machine.
//!
//! [`RecordingSession::dispatch`] is the only way to change the session. It
//! takes one event, applies the transition table and returns the commands the
//! driver has to execute. Collaborator completions come back in as new
//! events, so dispatch is never re-entered.

use std::sync::Arc;

use super::artifact::{format_size, RecordingArtifact, RecordingBuffer};
use super::error::{CaptureError, SessionError};
use super::event::{AttemptId, PlaybackHandle, SessionCommand, SessionEvent};
use super::state::{self, SessionState};
use super::text::TextKey;

/// Injected settings for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// File name of the artifact without extension
    pub file_stem: String,
    /// Extension matching the recorder's output container
    pub extension: String,
    pub mime_type: String,
    /// Wait for the recorder's start notification before entering Recording.
    /// When false the session goes straight to Recording once the device is open.
    pub await_recorder_start: bool,
}

impl SessionConfig {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem, self.extension)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file_stem: "recording".to_string(),
            extension: "mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
            await_recorder_start: true,
        }
    }
}

/// One user-facing error message, identified by its text key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flash {
    pub key: TextKey,
}

impl Flash {
    pub fn error(key: TextKey) -> Self {
        Self { key }
    }
}

/// Snapshot of everything the UI renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub state: SessionState,
    pub description: TextKey,
    pub record_action: TextKey,
    pub playback_action: TextKey,
    pub disallow_record: bool,
    pub disallow_upload: bool,
    pub disallow_playback: bool,
    pub recording_size: String,
    /// Bytes received so far in the current attempt
    pub buffered_bytes: usize,
    pub flash: Option<Flash>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveAttempt {
    attempt: AttemptId,
    /// A recorder was started for this attempt and must be stopped
    recorder_attached: bool,
}

pub struct RecordingSession {
    config: SessionConfig,
    state: SessionState,
    /// The attempt whose events are honoured. Clearing it detaches the
    /// finalize handler.
    active: Option<ActiveAttempt>,
    attempt_seq: u64,
    buffer: RecordingBuffer,
    artifact: Option<Arc<RecordingArtifact>>,
    playback: Option<PlaybackHandle>,
    playback_seq: u64,
    flash: Option<Flash>,
    closed: bool,
}

impl RecordingSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            active: None,
            attempt_seq: 0,
            buffer: RecordingBuffer::default(),
            artifact: None,
            playback: None,
            playback_seq: 0,
            flash: None,
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn artifact(&self) -> Option<&Arc<RecordingArtifact>> {
        self.artifact.as_ref()
    }

    pub fn has_recording(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn flash(&self) -> Option<Flash> {
        self.flash
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Attempt whose device/recorder events are currently honoured.
    pub fn active_attempt(&self) -> Option<AttemptId> {
        self.active.map(|a| a.attempt)
    }

    pub fn disallow_record(&self) -> bool {
        state::disallow_record(self.state)
    }

    pub fn disallow_upload(&self) -> bool {
        state::disallow_upload(self.state)
    }

    pub fn disallow_playback(&self) -> bool {
        state::disallow_playback(self.state, self.has_recording())
    }

    pub fn recording_size(&self) -> String {
        format_size(self.artifact.as_ref().map(|a| a.len()))
    }

    pub fn view(&self) -> SessionView {
        let has_recording = self.has_recording();
        SessionView {
            state: self.state,
            description: state::state_description(self.state, has_recording),
            record_action: state::record_action(self.state),
            playback_action: state::playback_action(self.state),
            disallow_record: self.disallow_record(),
            disallow_upload: self.disallow_upload(),
            disallow_playback: self.disallow_playback(),
            recording_size: self.recording_size(),
            buffered_bytes: self.buffer.len(),
            flash: self.flash,
        }
    }

    /// Applies one event and returns the side effects to execute, in order.
    pub fn dispatch(&mut self, event: SessionEvent) -> Vec<SessionCommand> {
        let before = self.state;
        let name = event.name();
        let mut commands = Vec::new();

        match event {
            SessionEvent::Show => {
                self.release_all(&mut commands);
                self.closed = false;
            }
            SessionEvent::Close => {
                if !self.closed {
                    self.release_all(&mut commands);
                    commands.push(SessionCommand::Close);
                    self.closed = true;
                }
            }
            SessionEvent::StartStop => self.on_start_stop(&mut commands),
            SessionEvent::Cancel => self.on_cancel(&mut commands),
            SessionEvent::Upload => self.on_upload(&mut commands),
            SessionEvent::TogglePlayback => self.on_toggle_playback(&mut commands),

            SessionEvent::DeviceAcquired {
                attempt,
                sample_rate,
            } => self.on_device_acquired(attempt, sample_rate, &mut commands),
            SessionEvent::DeviceFailed { attempt, error } => {
                if self.is_pending(attempt) {
                    self.active = None;
                    self.state = SessionState::Idle;
                    self.fail(SessionError::DeviceAcquisition(error));
                }
            }
            SessionEvent::AcquireTimedOut { attempt } => {
                if self.is_pending(attempt) {
                    self.active = None;
                    self.state = SessionState::Idle;
                    self.fail(SessionError::DeviceAcquisition(CaptureError::TimedOut));
                    commands.push(SessionCommand::ReleaseCapture { attempt });
                }
            }

            SessionEvent::RecorderStarted { attempt } => {
                if self.is_current(attempt) && self.state == SessionState::RecordingStart {
                    self.state = SessionState::Recording;
                }
            }
            SessionEvent::DataAvailable { attempt, chunk } => {
                if self.is_current(attempt)
                    && matches!(
                        self.state,
                        SessionState::Recording | SessionState::Processing
                    )
                {
                    self.buffer.append(chunk);
                } else {
                    tracing::debug!(
                        "Dropping {} byte chunk from attempt {} in state {}",
                        chunk.len(),
                        attempt,
                        self.state
                    );
                }
            }
            SessionEvent::RecorderStopped { attempt } => {
                self.on_recorder_stopped(attempt, &mut commands)
            }
            SessionEvent::RecorderFailed { attempt, error } => {
                if self.is_current(attempt)
                    && matches!(
                        self.state,
                        SessionState::RecordingStart
                            | SessionState::Recording
                            | SessionState::Processing
                    )
                {
                    self.active = None;
                    self.buffer.clear();
                    commands.push(SessionCommand::ForceStopRecorder { attempt });
                    commands.push(SessionCommand::ReleaseCapture { attempt });
                    self.state = SessionState::Idle;
                    self.fail(SessionError::Recorder(error));
                }
            }

            SessionEvent::PlaybackEnded { handle } => {
                if self.state == SessionState::Playing && self.playback == Some(handle) {
                    self.state = SessionState::Idle;
                }
            }
            SessionEvent::PlaybackFailed { handle, error } => {
                if self.playback == Some(handle) {
                    if self.state == SessionState::Playing {
                        self.state = SessionState::Idle;
                    }
                    self.fail(SessionError::Playback(error));
                }
            }
        }

        if self.state != before {
            tracing::debug!("Session {} -> {} on {}", before, self.state, name);
        } else if commands.is_empty() {
            tracing::trace!("Session ignored {} in state {}", name, self.state);
        }

        commands
    }

    fn on_start_stop(&mut self, commands: &mut Vec<SessionCommand>) {
        if self.closed {
            return;
        }
        match self.state {
            SessionState::Idle => {
                self.discard_recording(commands);
                self.flash = None;
                self.attempt_seq += 1;
                let attempt = AttemptId(self.attempt_seq);
                self.active = Some(ActiveAttempt {
                    attempt,
                    recorder_attached: false,
                });
                self.state = SessionState::RequestingDevice;
                tracing::info!("Recording attempt {} requested", attempt);
                commands.push(SessionCommand::AcquireDevice { attempt });
            }
            SessionState::Recording => {
                if let Some(active) = self.active {
                    self.state = SessionState::Processing;
                    commands.push(SessionCommand::StopRecorder {
                        attempt: active.attempt,
                    });
                    commands.push(SessionCommand::ReleaseCapture {
                        attempt: active.attempt,
                    });
                }
            }
            _ => {}
        }
    }

    fn on_cancel(&mut self, commands: &mut Vec<SessionCommand>) {
        // Taking the attempt first detaches the finalize handler, so a stop
        // completion that is already queued finds nothing to finalize.
        let Some(active) = self.active.take() else {
            return;
        };
        if active.recorder_attached {
            commands.push(SessionCommand::ForceStopRecorder {
                attempt: active.attempt,
            });
        }
        commands.push(SessionCommand::ReleaseCapture {
            attempt: active.attempt,
        });
        self.buffer.clear();
        self.discard_recording(commands);
        self.state = SessionState::Idle;
        tracing::info!("Recording attempt {} cancelled", active.attempt);
    }

    fn on_upload(&mut self, commands: &mut Vec<SessionCommand>) {
        if self.closed || self.state != SessionState::Idle {
            return;
        }
        let Some(artifact) = self.artifact.clone() else {
            self.fail(SessionError::NoRecording);
            return;
        };
        tracing::info!(
            "Handing off {} ({} bytes) for upload",
            artifact.file_name(),
            artifact.len()
        );
        commands.push(SessionCommand::Upload { artifact });
        if let Some(handle) = self.playback.take() {
            commands.push(SessionCommand::ReleasePlayback { handle });
        }
        commands.push(SessionCommand::Close);
        self.closed = true;
    }

    fn on_toggle_playback(&mut self, commands: &mut Vec<SessionCommand>) {
        if self.closed {
            return;
        }
        match (self.state, self.playback) {
            (SessionState::Idle, Some(handle)) if !self.disallow_playback() => {
                self.state = SessionState::Playing;
                commands.push(SessionCommand::StartPlayback { handle });
            }
            (SessionState::Playing, Some(handle)) => {
                self.state = SessionState::Idle;
                commands.push(SessionCommand::StopPlayback { handle });
            }
            _ => {}
        }
    }

    fn on_device_acquired(
        &mut self,
        attempt: AttemptId,
        sample_rate: u32,
        commands: &mut Vec<SessionCommand>,
    ) {
        if !self.is_pending(attempt) {
            tracing::debug!("Releasing device from stale attempt {}", attempt);
            commands.push(SessionCommand::ReleaseCapture { attempt });
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.recorder_attached = true;
        }
        self.state = if self.config.await_recorder_start {
            SessionState::RecordingStart
        } else {
            SessionState::Recording
        };
        commands.push(SessionCommand::StartRecorder {
            attempt,
            sample_rate,
        });
    }

    fn on_recorder_stopped(&mut self, attempt: AttemptId, commands: &mut Vec<SessionCommand>) {
        if !self.is_current(attempt) {
            tracing::debug!("Ignoring stop from detached attempt {}", attempt);
            return;
        }
        match self.state {
            SessionState::Processing => self.finalize(commands),
            SessionState::Recording => {
                // The recorder ended on its own; keep what it produced.
                commands.push(SessionCommand::ReleaseCapture { attempt });
                self.finalize(commands);
            }
            SessionState::RecordingStart => {
                self.active = None;
                commands.push(SessionCommand::ReleaseCapture { attempt });
                self.state = SessionState::Idle;
                self.fail(SessionError::Recorder(
                    "recorder stopped before it started".to_string(),
                ));
            }
            _ => {}
        }
    }

    fn finalize(&mut self, commands: &mut Vec<SessionCommand>) {
        self.active = None;
        let chunk_count = self.buffer.chunk_count();
        let artifact = Arc::new(
            self.buffer
                .finalize(&self.config.mime_type, &self.config.file_name()),
        );
        tracing::info!(
            "Recording finalized: {} bytes from {} chunks ({})",
            artifact.len(),
            chunk_count,
            artifact.mime_type()
        );

        self.playback_seq += 1;
        let handle = PlaybackHandle(self.playback_seq);
        self.playback = Some(handle);
        self.artifact = Some(Arc::clone(&artifact));
        commands.push(SessionCommand::PreparePlayback { handle, artifact });
        self.state = SessionState::Idle;
    }

    /// Drops the artifact and releases its playback handle.
    fn discard_recording(&mut self, commands: &mut Vec<SessionCommand>) {
        if let Some(handle) = self.playback.take() {
            if self.state == SessionState::Playing {
                commands.push(SessionCommand::StopPlayback { handle });
            }
            commands.push(SessionCommand::ReleasePlayback { handle });
        }
        self.artifact = None;
    }

    fn release_all(&mut self, commands: &mut Vec<SessionCommand>) {
        if let Some(active) = self.active.take() {
            if active.recorder_attached {
                commands.push(SessionCommand::ForceStopRecorder {
                    attempt: active.attempt,
                });
            }
            commands.push(SessionCommand::ReleaseCapture {
                attempt: active.attempt,
            });
        }
        self.discard_recording(commands);
        self.buffer.clear();
        self.flash = None;
        self.state = SessionState::Idle;
    }

    fn fail(&mut self, error: SessionError) {
        tracing::warn!("{}", error);
        self.flash = Some(Flash::error(error.flash_key()));
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.active.is_some_and(|a| a.attempt == attempt)
    }

    fn is_pending(&self, attempt: AttemptId) -> bool {
        self.is_current(attempt) && self.state == SessionState::RequestingDevice
    }
}
