//! Errors the session recovers from locally.

use super::text::TextKey;

/// Why a capture device could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The OS or audio backend refused access to the microphone
    PermissionDenied(String),
    /// No matching input device exists
    NoDevice(String),
    /// The backend failed for another reason
    Backend(String),
    /// The provider did not answer before the acquisition deadline
    TimedOut,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied(msg) => write!(f, "Microphone access denied: {msg}"),
            CaptureError::NoDevice(msg) => write!(f, "No input device: {msg}"),
            CaptureError::Backend(msg) => write!(f, "Audio backend error: {msg}"),
            CaptureError::TimedOut => write!(f, "Timed out waiting for the microphone"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Failures surfaced to the user as a flash message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    DeviceAcquisition(CaptureError),
    Recorder(String),
    Playback(String),
    /// Upload requested before anything was recorded
    NoRecording,
}

impl SessionError {
    pub fn flash_key(&self) -> TextKey {
        match self {
            SessionError::DeviceAcquisition(_) => TextKey::ErrorFailed,
            SessionError::Recorder(_) => TextKey::ErrorRecorder,
            SessionError::Playback(_) => TextKey::ErrorPlayback,
            SessionError::NoRecording => TextKey::ErrorNoRecord,
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::DeviceAcquisition(err) => write!(f, "Device acquisition failed: {err}"),
            SessionError::Recorder(msg) => write!(f, "Recorder failed: {msg}"),
            SessionError::Playback(msg) => write!(f, "Playback failed: {msg}"),
            SessionError::NoRecording => write!(f, "Nothing has been recorded"),
        }
    }
}

impl std::error::Error for SessionError {}
