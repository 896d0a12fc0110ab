//! Recording session core.
//!
//! A single-threaded state machine that keeps the recorder modal consistent
//! while device, recorder and playback callbacks arrive in any order. It owns
//! no I/O: every side effect leaves as a [`SessionCommand`] and every
//! completion comes back as a [`SessionEvent`].

pub mod artifact;
pub mod error;
pub mod event;
pub mod machine;
pub mod state;
pub mod text;

pub use artifact::{format_size, RecordingArtifact};
pub use error::{CaptureError, SessionError};
pub use event::{AttemptId, PlaybackHandle, SessionCommand, SessionEvent};
pub use machine::{Flash, RecordingSession, SessionConfig, SessionView};
pub use state::SessionState;
pub use text::{CatalogText, TextKey, TextProvider};
