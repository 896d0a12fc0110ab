//! Session states and the UI affordances derived from them.
//!
//! Every predicate here is a pure function of `(state, has_recording)`. The
//! session never stores these flags, so they cannot drift from the state.

use super::text::TextKey;

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing in flight. A finished recording may be present.
    #[default]
    Idle,
    /// Capture device requested, waiting for the provider to answer
    RequestingDevice,
    /// Device acquired, recorder warming up
    RecordingStart,
    /// Recorder running, chunks arriving
    Recording,
    /// Stop requested, waiting for the recorder's final flush
    Processing,
    /// Previewing the finished recording
    Playing,
}

impl SessionState {
    pub const ALL: [SessionState; 6] = [
        SessionState::Idle,
        SessionState::RequestingDevice,
        SessionState::RecordingStart,
        SessionState::Recording,
        SessionState::Processing,
        SessionState::Playing,
    ];

    /// Whether a recording attempt is between start and finish.
    pub fn is_capturing(self) -> bool {
        matches!(
            self,
            SessionState::RequestingDevice
                | SessionState::RecordingStart
                | SessionState::Recording
                | SessionState::Processing
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RequestingDevice => write!(f, "requesting_device"),
            Self::RecordingStart => write!(f, "recording_start"),
            Self::Recording => write!(f, "recording"),
            Self::Processing => write!(f, "processing"),
            Self::Playing => write!(f, "playing"),
        }
    }
}

/// The record button is usable only to start from Idle or to stop from Recording.
pub fn disallow_record(state: SessionState) -> bool {
    state == SessionState::RecordingStart
        || (state != SessionState::Idle && state != SessionState::Recording)
}

pub fn disallow_upload(state: SessionState) -> bool {
    state != SessionState::Idle
}

pub fn disallow_playback(state: SessionState, has_recording: bool) -> bool {
    (state != SessionState::Idle && state != SessionState::Playing) || !has_recording
}

/// Label for the record button.
pub fn record_action(state: SessionState) -> TextKey {
    match state {
        SessionState::Recording => TextKey::ActionStopRecording,
        _ => TextKey::ActionStartRecording,
    }
}

/// Label for the playback button.
pub fn playback_action(state: SessionState) -> TextKey {
    match state {
        SessionState::Playing => TextKey::ActionStopPlayback,
        _ => TextKey::ActionPlay,
    }
}

/// Status line shown above the controls.
pub fn state_description(state: SessionState, has_recording: bool) -> TextKey {
    match state {
        SessionState::Idle if has_recording => TextKey::StateRecorded,
        SessionState::Idle => TextKey::StateNoRecording,
        SessionState::RequestingDevice => TextKey::StateRequestingDevice,
        SessionState::RecordingStart => TextKey::StateRecordingStart,
        SessionState::Recording => TextKey::StateRecording,
        SessionState::Processing => TextKey::StateProcessing,
        SessionState::Playing => TextKey::StatePlaying,
    }
}
