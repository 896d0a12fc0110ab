//! Inputs to and outputs from the session's dispatch function.
//!
//! Events come from the user, the capture provider, the recorder and the
//! playback port. Commands are the side effects the driver must carry out.

use std::sync::Arc;

use super::artifact::RecordingArtifact;
use super::error::CaptureError;

/// Identifies one recording attempt. Device and recorder events carry the
/// attempt they belong to so late events from an abandoned attempt can be
/// told apart from current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies the preview resource built for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Modal shown; resets the session
    Show,
    /// Modal dismissed by the host
    Close,
    /// Record button pressed
    StartStop,
    Cancel,
    Upload,
    TogglePlayback,

    DeviceAcquired { attempt: AttemptId, sample_rate: u32 },
    DeviceFailed { attempt: AttemptId, error: CaptureError },
    AcquireTimedOut { attempt: AttemptId },

    RecorderStarted { attempt: AttemptId },
    DataAvailable { attempt: AttemptId, chunk: Vec<u8> },
    RecorderStopped { attempt: AttemptId },
    RecorderFailed { attempt: AttemptId, error: String },

    PlaybackEnded { handle: PlaybackHandle },
    PlaybackFailed { handle: PlaybackHandle, error: String },
}

impl SessionEvent {
    /// Short name for logging, without payloads.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Show => "show",
            SessionEvent::Close => "close",
            SessionEvent::StartStop => "start_stop",
            SessionEvent::Cancel => "cancel",
            SessionEvent::Upload => "upload",
            SessionEvent::TogglePlayback => "toggle_playback",
            SessionEvent::DeviceAcquired { .. } => "device_acquired",
            SessionEvent::DeviceFailed { .. } => "device_failed",
            SessionEvent::AcquireTimedOut { .. } => "acquire_timed_out",
            SessionEvent::RecorderStarted { .. } => "recorder_started",
            SessionEvent::DataAvailable { .. } => "data_available",
            SessionEvent::RecorderStopped { .. } => "recorder_stopped",
            SessionEvent::RecorderFailed { .. } => "recorder_failed",
            SessionEvent::PlaybackEnded { .. } => "playback_ended",
            SessionEvent::PlaybackFailed { .. } => "playback_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    AcquireDevice { attempt: AttemptId },
    StartRecorder { attempt: AttemptId, sample_rate: u32 },
    /// Graceful stop; the recorder flushes and then reports `RecorderStopped`
    StopRecorder { attempt: AttemptId },
    /// Immediate stop; no stop notification is expected or honoured
    ForceStopRecorder { attempt: AttemptId },
    /// Stop all tracks of the capture stream and release the device
    ReleaseCapture { attempt: AttemptId },

    PreparePlayback { handle: PlaybackHandle, artifact: Arc<RecordingArtifact> },
    StartPlayback { handle: PlaybackHandle },
    StopPlayback { handle: PlaybackHandle },
    ReleasePlayback { handle: PlaybackHandle },

    /// Hand the artifact to the upload sink
    Upload { artifact: Arc<RecordingArtifact> },
    /// Ask the host to dismiss the modal
    Close,
}
