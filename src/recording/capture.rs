//! Microphone capture through cpal.
//!
//! Each recording attempt gets its own capture thread, which opens the device,
//! owns the stream and drops it once the attempt is released. Opening never
//! blocks the UI thread, so a hung device cannot freeze the modal. The callback mixes
//! each buffer down to mono `i16` and pushes it into a [`PcmTap`]; whoever is
//! attached to the tap (the recorder) receives the samples, otherwise they are
//! dropped.

use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use super::{CaptureProvider, EventSender};
use crate::session::{AttemptId, CaptureError, SessionEvent};

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Hand-off point between a capture stream and a recorder.
#[derive(Clone, Default)]
pub struct PcmTap {
    sink: Arc<Mutex<Option<Sender<Vec<i16>>>>>,
}

impl PcmTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sender: Sender<Vec<i16>>) {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = Some(sender);
        }
    }

    /// Drops the attached sender, which ends the receiving side's input.
    pub fn detach(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            sink.take();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().map(|sink| sink.is_some()).unwrap_or(false)
    }

    pub fn push(&self, samples: Vec<i16>) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        if let Some(sender) = sink.as_ref() {
            if sender.send(samples).is_err() {
                // Receiver is gone; stop feeding it
                sink.take();
            }
        }
    }
}

/// Opens cpal input streams, one per recording attempt.
pub struct CpalCapture {
    /// Device name, numeric index, or "default"
    device_name: String,
    /// Rate asked for in the config; the device's native rate always wins
    preferred_rate: u32,
    /// Dropping an attempt's sender ends its capture thread
    releases: HashMap<AttemptId, Sender<()>>,
}

impl CpalCapture {
    pub fn new(device_name: String, preferred_rate: u32) -> Self {
        Self {
            device_name,
            preferred_rate,
            releases: HashMap::new(),
        }
    }
}

fn open_stream(
    device_name: &str,
    preferred_rate: u32,
    attempt: AttemptId,
    tap: PcmTap,
    events: EventSender,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let device = suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        if device_name == "default" {
            host.default_input_device().ok_or_else(|| {
                CaptureError::NoDevice("No audio input device available".to_string())
            })
        } else {
            find_device_by_name(&host, device_name)
        }
    })?;

    let device_name = device
        .name()
        .unwrap_or_else(|_| "Unknown device".to_string());
    tracing::info!("Recording device for attempt {}: {}", attempt, device_name);

    let supported = device
        .default_input_config()
        .map_err(map_config_error)?;
    let sample_rate = supported.sample_rate().0;
    if sample_rate != preferred_rate {
        tracing::warn!(
            "Configured sample rate {}Hz differs from device rate {}Hz, using device rate",
            preferred_rate,
            sample_rate
        );
    }
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    tracing::debug!(
        "Device configuration: {}Hz, {} channels, {:?}",
        sample_rate,
        config.channels,
        sample_format
    );

    let stream = match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, attempt, tap, events),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, attempt, tap, events),
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, attempt, tap, events),
        other => {
            return Err(CaptureError::Backend(format!(
                "Unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(map_build_error)?;

    stream.play().map_err(|e| classify_backend(e.to_string()))?;
    Ok((stream, sample_rate))
}

impl CaptureProvider for CpalCapture {
    fn request(&mut self, attempt: AttemptId, tap: PcmTap, events: EventSender) {
        let device_name = self.device_name.clone();
        let preferred_rate = self.preferred_rate;
        let stream_events = events.clone();
        let spawned = spawn_capture_thread(attempt, events.clone(), move || {
            open_stream(&device_name, preferred_rate, attempt, tap, stream_events)
        });

        match spawned {
            Ok(release) => {
                self.releases.insert(attempt, release);
            }
            Err(e) => {
                let error = CaptureError::Backend(format!("Failed to start capture thread: {e}"));
                tracing::warn!("Capture for attempt {} failed: {}", attempt, error);
                let _ = events.send(SessionEvent::DeviceFailed { attempt, error });
            }
        }
    }

    fn release(&mut self, attempt: AttemptId) {
        if self.releases.remove(&attempt).is_some() {
            tracing::debug!("Capture for attempt {} released", attempt);
        }
    }
}

/// Runs `open` on a new thread that keeps the stream alive until the returned
/// sender is dropped.
///
/// The stream is created, used and dropped on that thread only, since cpal
/// streams cannot move between threads. A device that opens after its attempt
/// was released is reported and then closed right away.
fn spawn_capture_thread<S, F>(
    attempt: AttemptId,
    events: EventSender,
    open: F,
) -> std::io::Result<Sender<()>>
where
    F: FnOnce() -> Result<(S, u32), CaptureError> + Send + 'static,
{
    let (release_tx, release_rx) = mpsc::channel::<()>();
    thread::Builder::new()
        .name(format!("capture-{}", attempt.0))
        .spawn(move || match open() {
            Ok((stream, sample_rate)) => {
                tracing::debug!("Capture stream for attempt {} started", attempt);
                let _ = events.send(SessionEvent::DeviceAcquired {
                    attempt,
                    sample_rate,
                });
                // Returns once the sender is dropped
                let _ = release_rx.recv();
                drop(stream);
                tracing::debug!("Capture stream for attempt {} closed", attempt);
            }
            Err(error) => {
                tracing::warn!("Capture for attempt {} failed: {}", attempt, error);
                let _ = events.send(SessionEvent::DeviceFailed { attempt, error });
            }
        })?;
    Ok(release_tx)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    attempt: AttemptId,
    tap: PcmTap,
    events: EventSender,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = config.channels as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if tap.is_attached() {
                tap.push(downmix(data, channels));
            }
        },
        move |err| {
            tracing::error!("Audio stream error: {}", err);
            let _ = events.send(SessionEvent::RecorderFailed {
                attempt,
                error: err.to_string(),
            });
        },
        None,
    )
}

/// Converts interleaved samples to mono `i16` by averaging the channels.
fn downmix<T>(data: &[T], channels: usize) -> Vec<i16>
where
    T: Sample,
    i16: FromSample<T>,
{
    if channels <= 1 {
        return data.iter().map(|&s| i16::from_sample(s)).collect();
    }
    data.chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i16::from_sample(s) as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

fn map_config_error(err: cpal::DefaultStreamConfigError) -> CaptureError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::NoDevice("The input device is no longer available".to_string())
        }
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            classify_backend(err.description)
        }
        other => CaptureError::Backend(other.to_string()),
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::NoDevice("The input device is no longer available".to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend(err.description),
        other => CaptureError::Backend(other.to_string()),
    }
}

/// Backends report refused microphone access as free text.
fn classify_backend(description: String) -> CaptureError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied(description)
    } else {
        CaptureError::Backend(description)
    }
}

/// Finds an input device by exact name or by its index in the device list.
pub(crate) fn find_device_by_name(
    host: &cpal::Host,
    device_spec: &str,
) -> Result<cpal::Device, CaptureError> {
    let devices: Vec<_> = host
        .input_devices()
        .map_err(|e| CaptureError::Backend(format!("Failed to enumerate devices: {e}")))?
        .collect();

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            CaptureError::NoDevice(format!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            ))
        });
    }

    devices
        .into_iter()
        .find(|device| device.name().is_ok_and(|name| name == device_spec))
        .ok_or_else(|| {
            CaptureError::NoDevice(format!(
                "Audio input device '{device_spec}' not found. Use 'composer-audio list-devices' to see available devices."
            ))
        })
}

/// Runs `f` with stderr pointed at /dev/null so ALSA's probing noise does not
/// corrupt the terminal UI. If the redirect cannot be set up, `f` runs as is.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let dev_null = match OpenOptions::new().write(true).open("/dev/null") {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!("Failed to open /dev/null: {}", e);
            return f();
        }
    };

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return f();
    }
    if unsafe { libc::dup2(dev_null.as_raw_fd(), libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(old_stderr) };
        return f();
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }
    result
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> T
where
    F: FnOnce() -> T,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_downmix_averages_channels() {
        let stereo: [i16; 6] = [100, 300, -50, 50, 1000, 0];
        assert_eq!(downmix(&stereo[..], 2), vec![200, 0, 500]);

        let mono: [i16; 3] = [1, 2, 3];
        assert_eq!(downmix(&mono[..], 1), vec![1, 2, 3]);
    }

    #[test]
    fn test_downmix_converts_float_samples() {
        let samples: [f32; 2] = [0.0, 0.0];
        assert_eq!(downmix(&samples[..], 1), vec![0, 0]);
        let loud = downmix(&[1.0f32][..], 1);
        assert!(loud[0] > 32000);
    }

    #[test]
    fn test_tap_forwards_only_while_attached() {
        let tap = PcmTap::new();
        tap.push(vec![1, 2]);

        let (tx, rx) = mpsc::channel();
        tap.attach(tx);
        assert!(tap.is_attached());
        tap.push(vec![3, 4]);
        tap.detach();
        tap.push(vec![5]);

        let received: Vec<Vec<i16>> = rx.iter().collect();
        assert_eq!(received, vec![vec![3, 4]]);
        assert!(!tap.is_attached());
    }

    #[test]
    fn test_tap_detaches_when_receiver_dropped() {
        let tap = PcmTap::new();
        let (tx, rx) = mpsc::channel();
        tap.attach(tx);
        drop(rx);
        tap.push(vec![1]);
        assert!(!tap.is_attached());
    }

    struct StreamGuard(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for StreamGuard {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn wait_until(flag: &std::sync::atomic::AtomicBool) -> bool {
        for _ in 0..500 {
            if flag.load(std::sync::atomic::Ordering::SeqCst) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_capture_thread_holds_stream_until_released() {
        let (tx, rx) = mpsc::channel();
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let guard = StreamGuard(closed.clone());
        let attempt = AttemptId(4);

        let release = spawn_capture_thread(attempt, tx, move || Ok((guard, 48000))).unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            SessionEvent::DeviceAcquired {
                attempt,
                sample_rate: 48000
            }
        );
        thread::sleep(Duration::from_millis(20));
        assert!(!closed.load(std::sync::atomic::Ordering::SeqCst));

        drop(release);
        assert!(wait_until(&closed));
    }

    #[test]
    fn test_slow_open_does_not_block_request() {
        let (tx, rx) = mpsc::channel();
        let (unblock_tx, unblock_rx) = mpsc::channel::<()>();
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let guard = StreamGuard(closed.clone());
        let attempt = AttemptId(5);

        let release = spawn_capture_thread(attempt, tx, move || {
            let _ = unblock_rx.recv();
            Ok((guard, 16000))
        })
        .unwrap();

        // Spawning returned while the device is still opening
        assert!(rx.try_recv().is_err());

        // Released before the open finishes: reported, then closed at once
        drop(release);
        unblock_tx.send(()).unwrap();
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            SessionEvent::DeviceAcquired { .. }
        ));
        assert!(wait_until(&closed));
    }

    #[test]
    fn test_capture_thread_reports_open_failure() {
        let (tx, rx) = mpsc::channel();
        let attempt = AttemptId(6);

        let _release = spawn_capture_thread::<(), _>(attempt, tx, move || {
            Err(CaptureError::PermissionDenied("denied".to_string()))
        })
        .unwrap();

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            SessionEvent::DeviceFailed {
                error: CaptureError::PermissionDenied(_),
                ..
            }
        ));
    }

    #[test]
    fn test_classify_backend_errors() {
        assert!(matches!(
            classify_backend("Permission denied by user".to_string()),
            CaptureError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_backend("device busy".to_string()),
            CaptureError::Backend(_)
        ));
    }
}
