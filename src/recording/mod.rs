//! Collaborators of the recording session.
//!
//! The session core only emits commands. This module holds the pieces that
//! carry them out: microphone capture through cpal, encoding through ffmpeg
//! or hound, preview playback, the driver loop that ties them to the session,
//! and the terminal modal.

pub mod capture;
pub mod driver;
pub mod encoder;
pub mod ffmpeg;
pub mod playback;
pub mod ui;

use std::sync::mpsc::Sender;

use crate::session::{AttemptId, PlaybackHandle, RecordingArtifact, SessionEvent};

pub use capture::{CpalCapture, PcmTap};
pub use driver::{DriverOutcome, SessionDriver};
pub use encoder::{EncoderFactory, EncoderFormat};
pub use playback::ProcessPlayback;
pub use ui::RecorderModal;

/// Channel collaborators use to report back to the driver.
pub type EventSender = Sender<SessionEvent>;

/// Opens and releases capture devices.
pub trait CaptureProvider {
    /// Requests an input device for `attempt`.
    ///
    /// The outcome is reported on `events` as `DeviceAcquired` or
    /// `DeviceFailed`, either before returning or later. Once acquired, mono
    /// PCM is pushed into `tap`.
    fn request(&mut self, attempt: AttemptId, tap: PcmTap, events: EventSender);

    /// Stops all tracks of the stream opened for `attempt`. Unknown attempts
    /// are ignored.
    fn release(&mut self, attempt: AttemptId);
}

/// Turns PCM into encoded chunks.
///
/// A started recorder reports `DataAvailable` for every chunk, then either
/// `RecorderStopped` after a graceful [`Recorder::stop`] or `RecorderFailed`.
pub trait Recorder {
    /// Attaches to the tap and reports `RecorderStarted`.
    fn start(&mut self, tap: &PcmTap) -> anyhow::Result<()>;
    /// Detaches from the tap and flushes the remaining output.
    fn stop(&mut self);
    /// Stops immediately without a stop notification.
    fn force_stop(&mut self);
}

pub trait RecorderFactory {
    fn create(
        &self,
        attempt: AttemptId,
        sample_rate: u32,
        events: EventSender,
    ) -> anyhow::Result<Box<dyn Recorder>>;
}

/// Outcome of a preview reported by [`PlaybackPort::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    Ended(PlaybackHandle),
    Failed(PlaybackHandle, String),
}

/// Preview resources for finished recordings.
pub trait PlaybackPort {
    fn prepare(&mut self, handle: PlaybackHandle, artifact: &RecordingArtifact)
        -> anyhow::Result<()>;
    fn start(&mut self, handle: PlaybackHandle) -> anyhow::Result<()>;
    fn stop(&mut self, handle: PlaybackHandle);
    /// Stops playback if needed and frees everything held for `handle`.
    fn release(&mut self, handle: PlaybackHandle);
    /// Reports a preview that finished since the last call.
    fn poll(&mut self) -> Option<PlaybackStatus>;
}
