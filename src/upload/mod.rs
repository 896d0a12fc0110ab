//! Hand-off of finished recordings to the forum.
//!
//! An [`UploadSink`] turns an artifact into an [`UploadReceipt`]; the
//! [`insert`] module turns the receipt into markup and delivers it.

pub mod discourse;
pub mod insert;

use serde::Deserialize;

use crate::session::RecordingArtifact;

pub use discourse::DiscourseUploader;
pub use insert::{audio_markup, OutputTarget};

/// The forum's record of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub id: u64,
    pub url: String,
    pub original_filename: String,
    /// Stable `upload://` reference used in post markup
    pub short_url: String,
    pub filesize: Option<u64>,
    pub extension: Option<String>,
    pub human_filesize: Option<String>,
}

/// Destination for finished recordings.
#[allow(async_fn_in_trait)]
pub trait UploadSink {
    async fn upload(&self, artifact: &RecordingArtifact) -> anyhow::Result<UploadReceipt>;
}
