//! Symbolic text keys and their display strings.
//!
//! The session only ever produces [`TextKey`] values. Turning a key into prose
//! is the job of a [`TextProvider`], so the same session can be rendered in
//! any language the config supplies.

use std::collections::HashMap;

/// Every user-facing string the recorder can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKey {
    Title,
    ActionStartRecording,
    ActionStopRecording,
    ActionPlay,
    ActionStopPlayback,
    ActionUpload,
    ActionCancel,
    StateNoRecording,
    StateRecorded,
    StateRequestingDevice,
    StateRecordingStart,
    StateRecording,
    StateProcessing,
    StatePlaying,
    SizeLabel,
    ErrorNoRecord,
    ErrorFailed,
    ErrorRecorder,
    ErrorPlayback,
}

impl TextKey {
    pub const ALL: [TextKey; 19] = [
        TextKey::Title,
        TextKey::ActionStartRecording,
        TextKey::ActionStopRecording,
        TextKey::ActionPlay,
        TextKey::ActionStopPlayback,
        TextKey::ActionUpload,
        TextKey::ActionCancel,
        TextKey::StateNoRecording,
        TextKey::StateRecorded,
        TextKey::StateRequestingDevice,
        TextKey::StateRecordingStart,
        TextKey::StateRecording,
        TextKey::StateProcessing,
        TextKey::StatePlaying,
        TextKey::SizeLabel,
        TextKey::ErrorNoRecord,
        TextKey::ErrorFailed,
        TextKey::ErrorRecorder,
        TextKey::ErrorPlayback,
    ];

    /// Stable identifier used as the lookup key in the `[text]` config table.
    pub fn id(self) -> &'static str {
        match self {
            Self::Title => "composer_audio.title",
            Self::ActionStartRecording => "composer_audio.action.start_recording",
            Self::ActionStopRecording => "composer_audio.action.stop_recording",
            Self::ActionPlay => "composer_audio.action.play",
            Self::ActionStopPlayback => "composer_audio.action.stop_playback",
            Self::ActionUpload => "composer_audio.action.upload",
            Self::ActionCancel => "composer_audio.action.cancel",
            Self::StateNoRecording => "composer_audio.state.no_recording",
            Self::StateRecorded => "composer_audio.state.recorded",
            Self::StateRequestingDevice => "composer_audio.state.requesting_device",
            Self::StateRecordingStart => "composer_audio.state.recording_start",
            Self::StateRecording => "composer_audio.state.recording",
            Self::StateProcessing => "composer_audio.state.processing",
            Self::StatePlaying => "composer_audio.state.playing",
            Self::SizeLabel => "composer_audio.size",
            Self::ErrorNoRecord => "composer_audio.error.no_record",
            Self::ErrorFailed => "composer_audio.error.failed",
            Self::ErrorRecorder => "composer_audio.error.recorder",
            Self::ErrorPlayback => "composer_audio.error.playback",
        }
    }

    /// Built-in English string.
    pub fn default_text(self) -> &'static str {
        match self {
            Self::Title => "Upload audio",
            Self::ActionStartRecording => "Start recording",
            Self::ActionStopRecording => "Stop recording",
            Self::ActionPlay => "Play",
            Self::ActionStopPlayback => "Stop",
            Self::ActionUpload => "Upload",
            Self::ActionCancel => "Cancel",
            Self::StateNoRecording => "No recording yet.",
            Self::StateRecorded => "Recording ready.",
            Self::StateRequestingDevice => "Waiting for microphone access...",
            Self::StateRecordingStart => "Starting recorder...",
            Self::StateRecording => "Recording...",
            Self::StateProcessing => "Processing...",
            Self::StatePlaying => "Playing...",
            Self::SizeLabel => "Size",
            Self::ErrorNoRecord => "You have to record something!",
            Self::ErrorFailed => {
                "An error occurred. Is microphone access enabled for this terminal?"
            }
            Self::ErrorRecorder => "Recording stopped unexpectedly.",
            Self::ErrorPlayback => "Could not play the recording.",
        }
    }

    pub fn from_id(id: &str) -> Option<TextKey> {
        Self::ALL.into_iter().find(|key| key.id() == id)
    }
}

/// Maps symbolic keys to display strings.
pub trait TextProvider {
    fn text(&self, key: TextKey) -> String;
}

/// English defaults with optional per-key overrides.
#[derive(Debug, Clone, Default)]
pub struct CatalogText {
    overrides: HashMap<TextKey, String>,
}

impl CatalogText {
    /// Builds a catalog from the `[text]` config table.
    ///
    /// Unknown ids are logged and skipped.
    pub fn with_overrides(table: &HashMap<String, String>) -> Self {
        let mut overrides = HashMap::new();
        for (id, value) in table {
            match TextKey::from_id(id) {
                Some(key) => {
                    overrides.insert(key, value.clone());
                }
                None => tracing::warn!("Ignoring unknown text key in config: {}", id),
            }
        }
        Self { overrides }
    }
}

impl TextProvider for CatalogText {
    fn text(&self, key: TextKey) -> String {
        self.overrides
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.default_text().to_string())
    }
}
