//! Record, review and upload a voice note.
//!
//! Runs the recorder modal until the user uploads or closes it, then posts the
//! recording to the forum and delivers the audio markup. Sending SIGUSR1 to the
//! process toggles recording, the same as pressing `r`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, ComposerAudioConfig};
use crate::recording::{
    ffmpeg, CpalCapture, DriverOutcome, EncoderFactory, EncoderFormat, ProcessPlayback,
    RecorderModal, SessionDriver,
};
use crate::session::{
    format_size, CatalogText, RecordingArtifact, RecordingSession, SessionConfig, SessionEvent,
};
use crate::ui::show_fatal;
use crate::upload::{audio_markup, DiscourseUploader, OutputTarget, UploadSink};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Opens the recorder and uploads the result when the user asks for it.
pub async fn handle_record(clipboard: bool, output: Option<String>) -> Result<(), anyhow::Error> {
    tracing::info!("=== composer-audio Recorder Started ===");

    let config_data = match ComposerAudioConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            show_fatal(&format!(
                "Configuration Error:\n\n{err}\n\nPlease check your ~/.config/composer-audio/composer-audio.toml file and try again."
            ))?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, output_format={}",
        config_data.audio.device,
        config_data.audio.sample_rate,
        config_data.audio.output_format
    );

    let format = EncoderFormat::parse(&config_data.audio.output_format)?;
    if !format.is_wav() {
        if let Err(err) = ffmpeg::find_ffmpeg() {
            show_fatal(&format!("Encoder Error:\n\n{err}"))?;
            return Err(err);
        }
    }

    let uploader = match build_uploader(&config_data) {
        Ok(uploader) => uploader,
        Err(err) => {
            tracing::error!("Upload is not configured: {err}");
            show_fatal(&format!("Upload Error:\n\n{err}"))?;
            return Err(err);
        }
    };
    let target = OutputTarget::from_flags(clipboard, output);

    let outcome = run_modal(&config_data, format)?;

    match outcome {
        DriverOutcome::Upload(artifact) => {
            deliver(&uploader, &artifact, &target, &std::env::temp_dir()).await?;
        }
        DriverOutcome::Closed => {
            tracing::info!("Recorder closed without upload");
        }
    }

    tracing::info!("=== composer-audio Recorder Exited Successfully ===");
    Ok(())
}

fn build_uploader(config_data: &ComposerAudioConfig) -> anyhow::Result<DiscourseUploader> {
    let credentials = config::load_credentials()?.ok_or_else(|| {
        anyhow::anyhow!("No forum credentials found. Please run 'composer-audio auth'.")
    })?;
    DiscourseUploader::new(&config_data.upload, credentials)
}

/// Runs the modal until it closes and returns what the user chose.
fn run_modal(
    config_data: &ComposerAudioConfig,
    format: EncoderFormat,
) -> anyhow::Result<DriverOutcome> {
    let text = CatalogText::with_overrides(&config_data.text);
    let session = RecordingSession::new(SessionConfig {
        file_stem: config_data.session.file_name.trim().to_string(),
        extension: format.extension().to_string(),
        mime_type: format.mime_type().to_string(),
        await_recorder_start: config_data.session.await_recorder_start,
    });

    let mut driver = SessionDriver::new(
        session,
        CpalCapture::new(
            config_data.audio.device.clone(),
            config_data.audio.sample_rate,
        ),
        EncoderFactory::new(format),
        ProcessPlayback::new(),
        config_data.session.acquire_timeout(),
    );
    driver.dispatch(SessionEvent::Show);

    let mut modal = RecorderModal::new()
        .map_err(|e| anyhow::anyhow!("Failed to initialize UI: {e}"))?;

    let toggle = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, toggle.clone())
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    tracing::debug!("Entering recorder loop");
    let result = loop {
        if toggle.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: toggling recording");
            driver.dispatch(SessionEvent::StartStop);
        }

        match modal.poll_event(POLL_INTERVAL) {
            Ok(Some(event)) => driver.dispatch(event),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Input handling error: {}", e);
                break Err(anyhow::anyhow!("Input handling error: {e}"));
            }
        }

        driver.pump();
        if driver.outcome().is_some() {
            break Ok(());
        }

        let view = driver.session().view();
        if let Err(e) = modal.render(&view, &text) {
            break Err(anyhow::anyhow!("Render failed: {e}"));
        }
    };

    let outcome = driver.take_outcome();
    driver.shutdown();
    modal
        .cleanup()
        .map_err(|e| anyhow::anyhow!("Cleanup failed: {e}"))?;
    result?;

    Ok(outcome.unwrap_or(DriverOutcome::Closed))
}

/// Uploads the artifact and hands the markup to `target`.
///
/// A failed upload keeps the recording in `fallback_dir` so it is not lost.
async fn deliver<U: UploadSink>(
    uploader: &U,
    artifact: &RecordingArtifact,
    target: &OutputTarget,
    fallback_dir: &Path,
) -> anyhow::Result<()> {
    eprintln!(
        "Uploading {} ({})...",
        artifact.file_name(),
        format_size(Some(artifact.len()))
    );

    let receipt = match uploader.upload(artifact).await {
        Ok(receipt) => receipt,
        Err(err) => {
            tracing::error!("Upload failed: {err}");
            return match save_recording(artifact, fallback_dir) {
                Ok(path) => Err(anyhow::anyhow!(
                    "{err}\nThe recording was saved to {}",
                    path.display()
                )),
                Err(save_err) => {
                    tracing::error!("Failed to keep recording: {save_err}");
                    Err(err)
                }
            };
        }
    };

    tracing::info!("Uploaded as {} ({})", receipt.short_url, receipt.url);
    target.insert(&audio_markup(&receipt))
}

/// Writes the artifact to `dir` under a timestamped name.
fn save_recording(artifact: &RecordingArtifact, dir: &Path) -> anyhow::Result<PathBuf> {
    let extension = Path::new(artifact.file_name())
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let path = dir.join(format!(
        "composer-audio-{}.{}",
        artifact.recorded_at().format("%Y%m%d-%H%M%S"),
        extension
    ));
    std::fs::write(&path, artifact.bytes())?;
    tracing::info!("Recording saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::artifact::RecordingBuffer;
    use crate::upload::UploadReceipt;

    struct FakeSink {
        fail: bool,
    }

    impl UploadSink for FakeSink {
        async fn upload(&self, artifact: &RecordingArtifact) -> anyhow::Result<UploadReceipt> {
            if self.fail {
                return Err(anyhow::anyhow!("Upload rejected (413)"));
            }
            Ok(UploadReceipt {
                id: 7,
                url: "/uploads/default/original/1X/abc.mp3".to_string(),
                original_filename: artifact.file_name().to_string(),
                short_url: "upload://abc.mp3".to_string(),
                filesize: Some(artifact.len() as u64),
                extension: Some("mp3".to_string()),
                human_filesize: None,
            })
        }
    }

    fn artifact() -> RecordingArtifact {
        let mut buffer = RecordingBuffer::default();
        buffer.append(vec![1, 2, 3]);
        buffer.append(vec![4]);
        buffer.finalize("audio/mpeg", "recording.mp3")
    }

    #[tokio::test]
    async fn test_deliver_writes_markup() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("markup.txt");
        let target = OutputTarget::File(out.clone());

        deliver(&FakeSink { fail: false }, &artifact(), &target, dir.path())
            .await
            .unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "![recording|audio](upload://abc.mp3)\n");
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("markup.txt");
        let target = OutputTarget::File(out.clone());

        let err = deliver(&FakeSink { fail: true }, &artifact(), &target, dir.path())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("413"));
        assert!(!out.exists());
        let saved: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "mp3"))
            .collect();
        assert_eq!(saved.len(), 1);
        assert_eq!(std::fs::read(&saved[0]).unwrap(), vec![1, 2, 3, 4]);
    }
}
