//! Recorders that turn captured PCM into encoded chunks.
//!
//! Compressed formats stream through an ffmpeg child process: PCM goes in on
//! stdin, encoded bytes come back on stdout and are reported chunk by chunk.
//! Uncompressed WAV is written in-process with hound and reported when the
//! recorder stops, since the header can only be finished at the end.

use std::io::{Cursor, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Result};
use hound::WavWriter;

use super::capture::PcmTap;
use super::ffmpeg::find_ffmpeg;
use super::{EventSender, Recorder, RecorderFactory};
use crate::session::{AttemptId, SessionEvent};

/// Size of the chunks reported as `DataAvailable`.
const CHUNK_SIZE: usize = 16 * 1024;

/// Output format parsed from `audio.output_format`, e.g. `"mp3 -ab 64k"`.
///
/// The first word is the ffmpeg codec, the rest are passed to ffmpeg as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFormat {
    codec: String,
    options: Vec<String>,
    container: &'static str,
    extension: &'static str,
    mime_type: &'static str,
}

impl EncoderFormat {
    pub fn parse(format: &str) -> Result<Self> {
        let parts: Vec<&str> = format.split_whitespace().collect();
        let Some((codec, options)) = parts.split_first() else {
            return Err(anyhow!("Invalid format string: empty"));
        };

        let (container, extension, mime_type) = match canonical_codec(codec) {
            "mp3" | "libmp3lame" => ("mp3", "mp3", "audio/mpeg"),
            "libopus" | "libvorbis" => ("ogg", "ogg", "audio/ogg"),
            "flac" => ("flac", "flac", "audio/flac"),
            "aac" => ("adts", "aac", "audio/aac"),
            "pcm_s16le" => ("wav", "wav", "audio/wav"),
            other => {
                return Err(anyhow!(
                    "Unsupported codec '{other}' in output_format. \
                     Use one of: mp3, libopus, libvorbis, flac, aac, pcm_s16le"
                ))
            }
        };

        Ok(Self {
            codec: canonical_codec(codec).to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            container,
            extension,
            mime_type,
        })
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    /// WAV is produced without ffmpeg.
    pub fn is_wav(&self) -> bool {
        self.codec == "pcm_s16le"
    }

    fn ffmpeg_args(&self, sample_rate: u32) -> Vec<String> {
        let mut args: Vec<String> = [
            "-loglevel", "error", "-f", "s16le", "-ar",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(sample_rate.to_string());
        args.extend(
            ["-ac", "1", "-i", "pipe:0", "-acodec"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(self.codec.clone());
        // Force mono output
        args.extend(["-ac".to_string(), "1".to_string()]);
        args.extend(self.options.iter().cloned());
        args.extend([
            "-f".to_string(),
            self.container.to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

/// ffmpeg's built-in opus and vorbis encoders are experimental and refuse to
/// run without `-strict -2`, so those names map to the library encoders.
fn canonical_codec(codec: &str) -> &str {
    match codec {
        "opus" => "libopus",
        "vorbis" => "libvorbis",
        other => other,
    }
}

/// Creates the recorder matching the configured format.
pub struct EncoderFactory {
    format: EncoderFormat,
}

impl EncoderFactory {
    pub fn new(format: EncoderFormat) -> Self {
        Self { format }
    }
}

impl RecorderFactory for EncoderFactory {
    fn create(
        &self,
        attempt: AttemptId,
        sample_rate: u32,
        events: EventSender,
    ) -> Result<Box<dyn Recorder>> {
        if self.format.is_wav() {
            Ok(Box::new(WavRecorder::new(attempt, sample_rate, events)?))
        } else {
            Ok(Box::new(FfmpegRecorder::spawn(
                &self.format,
                attempt,
                sample_rate,
                events,
            )?))
        }
    }
}

/// Sends recorder events unless the recorder was force-stopped.
#[derive(Clone)]
struct Notifier {
    attempt: AttemptId,
    events: EventSender,
    suppressed: Arc<AtomicBool>,
}

impl Notifier {
    fn new(attempt: AttemptId, events: EventSender) -> Self {
        Self {
            attempt,
            events,
            suppressed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    fn send(&self, event: SessionEvent) {
        if !self.is_suppressed() {
            let _ = self.events.send(event);
        }
    }

    fn chunk(&self, bytes: &[u8]) {
        self.send(SessionEvent::DataAvailable {
            attempt: self.attempt,
            chunk: bytes.to_vec(),
        });
    }

    fn stopped(&self) {
        self.send(SessionEvent::RecorderStopped {
            attempt: self.attempt,
        });
    }

    fn failed(&self, error: String) {
        self.send(SessionEvent::RecorderFailed {
            attempt: self.attempt,
            error,
        });
    }
}

/// The PCM side of a recorder: the sender handed to the tap on start.
struct PcmFeed {
    notifier: Notifier,
    pending: Option<Sender<Vec<i16>>>,
    tap: Option<PcmTap>,
}

impl PcmFeed {
    fn new(notifier: Notifier) -> (Self, Receiver<Vec<i16>>) {
        let (tx, rx) = mpsc::channel();
        let feed = Self {
            notifier,
            pending: Some(tx),
            tap: None,
        };
        (feed, rx)
    }

    fn start(&mut self, tap: &PcmTap) -> Result<()> {
        let sender = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("Recorder for attempt {} already started", self.notifier.attempt))?;
        self.notifier.send(SessionEvent::RecorderStarted {
            attempt: self.notifier.attempt,
        });
        tap.attach(sender);
        self.tap = Some(tap.clone());
        Ok(())
    }

    /// Ends the PCM input. Returns false if it had already ended.
    fn finish(&mut self) -> bool {
        let had_input = self.pending.take().is_some();
        match self.tap.take() {
            Some(tap) => {
                tap.detach();
                true
            }
            None => had_input,
        }
    }

    fn suppress(&self) {
        self.notifier.suppressed.store(true, Ordering::SeqCst);
    }
}

/// Streams PCM through an ffmpeg child process.
pub struct FfmpegRecorder {
    feed: PcmFeed,
    child: Arc<Mutex<Child>>,
}

impl FfmpegRecorder {
    pub fn spawn(
        format: &EncoderFormat,
        attempt: AttemptId,
        sample_rate: u32,
        events: EventSender,
    ) -> Result<Self> {
        let ffmpeg_path = find_ffmpeg()?;
        let mut child = Command::new(&ffmpeg_path)
            .args(format.ffmpeg_args(sample_rate))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("Failed to start ffmpeg: {e}"))?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("ffmpeg stdin unavailable"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("ffmpeg stdout unavailable"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("ffmpeg stderr unavailable"))?;
        let child = Arc::new(Mutex::new(child));

        let notifier = Notifier::new(attempt, events);
        let (feed, pcm_rx) = PcmFeed::new(notifier.clone());

        thread::Builder::new()
            .name("ffmpeg-writer".to_string())
            .spawn(move || write_pcm(stdin, pcm_rx))?;
        let reader_child = Arc::clone(&child);
        thread::Builder::new()
            .name("ffmpeg-reader".to_string())
            .spawn(move || read_encoded(stdout, stderr, reader_child, notifier))?;

        tracing::debug!(
            "ffmpeg recorder for attempt {} spawned ({} at {}Hz)",
            attempt,
            format.codec(),
            sample_rate
        );
        Ok(Self { feed, child })
    }
}

impl Recorder for FfmpegRecorder {
    fn start(&mut self, tap: &PcmTap) -> Result<()> {
        self.feed.start(tap)
    }

    fn stop(&mut self) {
        // Closing stdin makes ffmpeg flush and exit
        if self.feed.finish() {
            tracing::debug!("ffmpeg recorder for attempt {} stopping", self.feed.notifier.attempt);
        }
    }

    fn force_stop(&mut self) {
        self.feed.suppress();
        self.feed.finish();
        // A held lock means the reader is already reaping the process
        if let Ok(mut child) = self.child.try_lock() {
            if let Err(e) = child.kill() {
                tracing::debug!("Failed to kill ffmpeg: {}", e);
            }
        }
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if self.feed.pending.is_some() || self.feed.tap.is_some() {
            self.force_stop();
        }
    }
}

fn write_pcm(mut stdin: ChildStdin, pcm: Receiver<Vec<i16>>) {
    for samples in pcm {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        if let Err(e) = stdin.write_all(&bytes) {
            tracing::debug!("ffmpeg stdin closed: {}", e);
            break;
        }
    }
}

/// Reports ffmpeg's stdout as chunks, then the outcome once it exits.
///
/// stderr is drained on its own thread; a full stderr pipe would otherwise
/// stall ffmpeg before it closes stdout.
fn read_encoded(
    mut stdout: ChildStdout,
    stderr: ChildStderr,
    child: Arc<Mutex<Child>>,
    notifier: Notifier,
) {
    let stderr_reader = thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || drain_stderr(stderr));

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0usize;
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                notifier.chunk(&buf[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                notifier.failed(format!("Failed to read encoder output: {e}"));
                return;
            }
        }
    }

    let error_output = match stderr_reader {
        Ok(handle) => handle.join().unwrap_or_default(),
        Err(e) => {
            tracing::debug!("Failed to start ffmpeg stderr reader: {}", e);
            String::new()
        }
    };

    let status = match child.lock() {
        Ok(mut child) => child.wait(),
        Err(_) => {
            notifier.failed("ffmpeg process state poisoned".to_string());
            return;
        }
    };

    match status {
        Ok(status) if status.success() => {
            tracing::debug!("ffmpeg produced {} bytes", total);
            notifier.stopped();
        }
        Ok(status) => {
            if !notifier.is_suppressed() {
                tracing::error!("ffmpeg encoding failed: {}", error_output.trim());
            }
            notifier.failed(format!("ffmpeg exited with {status}: {}", error_output.trim()));
        }
        Err(e) => notifier.failed(format!("Failed to wait for ffmpeg: {e}")),
    }
}

/// Reads all of stderr, keeping only the tail for error messages.
fn drain_stderr(mut stderr: ChildStderr) -> String {
    const KEEP: usize = 4096;
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > KEEP {
                    tail.drain(..tail.len() - KEEP);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Collects PCM in memory and emits a WAV file when stopped.
pub struct WavRecorder {
    feed: PcmFeed,
}

impl WavRecorder {
    pub fn new(attempt: AttemptId, sample_rate: u32, events: EventSender) -> Result<Self> {
        let notifier = Notifier::new(attempt, events);
        let (feed, pcm_rx) = PcmFeed::new(notifier.clone());

        thread::Builder::new()
            .name("wav-writer".to_string())
            .spawn(move || {
                let samples: Vec<i16> = pcm_rx.into_iter().flatten().collect();
                if notifier.is_suppressed() {
                    return;
                }
                match encode_wav(&samples, sample_rate) {
                    Ok(bytes) => {
                        tracing::debug!(
                            "WAV encoded: {} samples, {} bytes",
                            samples.len(),
                            bytes.len()
                        );
                        for chunk in bytes.chunks(CHUNK_SIZE) {
                            notifier.chunk(chunk);
                        }
                        notifier.stopped();
                    }
                    Err(e) => notifier.failed(format!("WAV encoding failed: {e}")),
                }
            })?;

        Ok(Self { feed })
    }
}

impl Recorder for WavRecorder {
    fn start(&mut self, tap: &PcmTap) -> Result<()> {
        self.feed.start(tap)
    }

    fn stop(&mut self) {
        self.feed.finish();
    }

    fn force_stop(&mut self) {
        self.feed.suppress();
        self.feed.finish();
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        if self.feed.pending.is_some() || self.feed.tap.is_some() {
            self.force_stop();
        }
    }
}

/// Encodes mono 16-bit PCM as a WAV file in memory.
fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn next_event(rx: &Receiver<SessionEvent>) -> SessionEvent {
        rx.recv_timeout(Duration::from_secs(5))
            .expect("recorder event")
    }

    #[test]
    fn test_parse_formats() {
        let mp3 = EncoderFormat::parse("mp3 -ab 64k").unwrap();
        assert_eq!(mp3.codec(), "mp3");
        assert_eq!(mp3.extension(), "mp3");
        assert_eq!(mp3.mime_type(), "audio/mpeg");
        assert!(!mp3.is_wav());

        let opus = EncoderFormat::parse("libopus -b:a 32k").unwrap();
        assert_eq!(opus.extension(), "ogg");
        assert_eq!(opus.mime_type(), "audio/ogg");

        let wav = EncoderFormat::parse("pcm_s16le").unwrap();
        assert!(wav.is_wav());
        assert_eq!(wav.mime_type(), "audio/wav");
    }

    #[test]
    fn test_parse_maps_experimental_encoders() {
        let opus = EncoderFormat::parse("opus -b:a 24k").unwrap();
        assert_eq!(opus.codec(), "libopus");
        assert_eq!(opus.extension(), "ogg");
        assert_eq!(opus.ffmpeg_args(16000)[11], "libopus");

        let vorbis = EncoderFormat::parse("vorbis").unwrap();
        assert_eq!(vorbis.codec(), "libvorbis");
    }

    #[cfg(unix)]
    fn run_reader(script: &str) -> Vec<SessionEvent> {
        let mut child = Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();
        let child = Arc::new(Mutex::new(child));

        let (tx, rx) = mpsc::channel();
        let notifier = Notifier::new(AttemptId(2), tx);
        thread::spawn(move || read_encoded(stdout, stderr, child, notifier));

        let mut events = Vec::new();
        loop {
            let event = next_event(&rx);
            let done = matches!(
                event,
                SessionEvent::RecorderStopped { .. } | SessionEvent::RecorderFailed { .. }
            );
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_noisy_stderr_does_not_stall_encoder() {
        let events = run_reader("head -c 200000 /dev/zero >&2; printf x");
        assert_eq!(
            events,
            vec![
                SessionEvent::DataAvailable {
                    attempt: AttemptId(2),
                    chunk: b"x".to_vec(),
                },
                SessionEvent::RecorderStopped {
                    attempt: AttemptId(2)
                },
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_failure_reports_stderr() {
        let events = run_reader("echo 'Unknown encoder' >&2; exit 3");
        match events.last() {
            Some(SessionEvent::RecorderFailed { error, .. }) => {
                assert!(error.contains("Unknown encoder"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_empty_and_unknown() {
        assert!(EncoderFormat::parse("   ").is_err());
        let err = EncoderFormat::parse("wma").unwrap_err();
        assert!(err.to_string().contains("wma"));
    }

    #[test]
    fn test_ffmpeg_args_pipe_layout() {
        let format = EncoderFormat::parse("mp3 -ab 64k").unwrap();
        let args = format.ffmpeg_args(48000);
        assert_eq!(
            args,
            vec![
                "-loglevel", "error", "-f", "s16le", "-ar", "48000", "-ac", "1", "-i",
                "pipe:0", "-acodec", "mp3", "-ac", "1", "-ab", "64k", "-f", "mp3", "pipe:1",
            ]
        );
    }

    #[test]
    fn test_wav_recorder_emits_wav_on_stop() {
        let (tx, rx) = mpsc::channel();
        let attempt = AttemptId(7);
        let tap = PcmTap::new();
        let mut recorder = WavRecorder::new(attempt, 16000, tx).unwrap();

        recorder.start(&tap).unwrap();
        assert_eq!(next_event(&rx), SessionEvent::RecorderStarted { attempt });
        assert!(tap.is_attached());

        tap.push(vec![1, -2, 3]);
        tap.push(vec![4]);
        recorder.stop();
        assert!(!tap.is_attached());

        let mut bytes = Vec::new();
        loop {
            match next_event(&rx) {
                SessionEvent::DataAvailable { attempt: a, chunk } => {
                    assert_eq!(a, attempt);
                    bytes.extend(chunk);
                }
                SessionEvent::RecorderStopped { attempt: a } => {
                    assert_eq!(a, attempt);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -2, 3, 4]);
    }

    #[test]
    fn test_wav_recorder_force_stop_is_silent() {
        let (tx, rx) = mpsc::channel();
        let attempt = AttemptId(1);
        let tap = PcmTap::new();
        let mut recorder = WavRecorder::new(attempt, 16000, tx).unwrap();
        recorder.start(&tap).unwrap();
        assert_eq!(next_event(&rx), SessionEvent::RecorderStarted { attempt });

        tap.push(vec![1, 2, 3]);
        recorder.force_stop();

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_start_twice_fails() {
        let (tx, _rx) = mpsc::channel();
        let tap = PcmTap::new();
        let mut recorder = WavRecorder::new(AttemptId(1), 16000, tx).unwrap();
        recorder.start(&tap).unwrap();
        assert!(recorder.start(&tap).is_err());
    }
}
