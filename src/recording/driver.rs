//! Runs a [`RecordingSession`] against real collaborators.
//!
//! The driver owns the session and the event channel. It executes the
//! commands a dispatch returns, and [`SessionDriver::pump`] feeds collaborator
//! events back in one at a time. All of this happens on the UI thread;
//! collaborator threads only ever send on the channel.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::capture::PcmTap;
use super::{CaptureProvider, EventSender, PlaybackPort, PlaybackStatus, Recorder, RecorderFactory};
use crate::session::{
    AttemptId, RecordingArtifact, RecordingSession, SessionCommand, SessionEvent, SessionState,
};

/// How the session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverOutcome {
    /// The user chose to upload this recording
    Upload(Arc<RecordingArtifact>),
    /// The modal was dismissed without uploading
    Closed,
}

pub struct SessionDriver<C, F, P> {
    session: RecordingSession,
    capture: C,
    recorders: F,
    playback: P,
    events_tx: EventSender,
    events_rx: Receiver<SessionEvent>,
    tap: Option<(AttemptId, PcmTap)>,
    recorder: Option<(AttemptId, Box<dyn Recorder>)>,
    acquire_timeout: Option<Duration>,
    acquire_deadline: Option<(AttemptId, Instant)>,
    outcome: Option<DriverOutcome>,
}

impl<C, F, P> SessionDriver<C, F, P>
where
    C: CaptureProvider,
    F: RecorderFactory,
    P: PlaybackPort,
{
    /// `acquire_timeout` of `None` waits for the capture provider forever.
    pub fn new(
        session: RecordingSession,
        capture: C,
        recorders: F,
        playback: P,
        acquire_timeout: Option<Duration>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            session,
            capture,
            recorders,
            playback,
            events_tx,
            events_rx,
            tap: None,
            recorder: None,
            acquire_timeout,
            acquire_deadline: None,
            outcome: None,
        }
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    /// Sender for events produced outside the driver, such as signals.
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn outcome(&self) -> Option<&DriverOutcome> {
        self.outcome.as_ref()
    }

    pub fn take_outcome(&mut self) -> Option<DriverOutcome> {
        self.outcome.take()
    }

    pub fn dispatch(&mut self, event: SessionEvent) {
        let finished = match &event {
            SessionEvent::RecorderStopped { attempt } | SessionEvent::RecorderFailed { attempt, .. } => {
                Some(*attempt)
            }
            _ => None,
        };

        for command in self.session.dispatch(event) {
            self.execute(command);
        }

        if let Some(attempt) = finished {
            if self.recorder.as_ref().is_some_and(|(a, _)| *a == attempt) {
                self.recorder = None;
            }
        }
    }

    /// Handles everything that happened since the last call: the acquisition
    /// deadline, playback completion and queued collaborator events.
    pub fn pump(&mut self) {
        self.check_deadline();
        if let Some(status) = self.playback.poll() {
            match status {
                PlaybackStatus::Ended(handle) => self.dispatch(SessionEvent::PlaybackEnded { handle }),
                PlaybackStatus::Failed(handle, error) => {
                    self.dispatch(SessionEvent::PlaybackFailed { handle, error })
                }
            }
        }
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event);
        }
    }

    /// Closes the session and releases whatever is still held.
    pub fn shutdown(&mut self) {
        self.dispatch(SessionEvent::Close);
        self.pump();
        if let Some((attempt, mut recorder)) = self.recorder.take() {
            tracing::debug!("Dropping recorder for attempt {} on shutdown", attempt);
            recorder.force_stop();
        }
    }

    fn execute(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::AcquireDevice { attempt } => {
                let tap = PcmTap::new();
                self.tap = Some((attempt, tap.clone()));
                self.acquire_deadline = self
                    .acquire_timeout
                    .map(|timeout| (attempt, Instant::now() + timeout));
                self.capture.request(attempt, tap, self.events_tx.clone());
            }
            SessionCommand::StartRecorder {
                attempt,
                sample_rate,
            } => self.start_recorder(attempt, sample_rate),
            SessionCommand::StopRecorder { attempt } => {
                if let Some((held, recorder)) = self.recorder.as_mut() {
                    if *held == attempt {
                        recorder.stop();
                    }
                }
            }
            SessionCommand::ForceStopRecorder { attempt } => {
                if self.recorder.as_ref().is_some_and(|(held, _)| *held == attempt) {
                    if let Some((_, mut recorder)) = self.recorder.take() {
                        recorder.force_stop();
                    }
                }
            }
            SessionCommand::ReleaseCapture { attempt } => {
                self.capture.release(attempt);
                if self.tap.as_ref().is_some_and(|(held, _)| *held == attempt) {
                    if let Some((_, tap)) = self.tap.take() {
                        tap.detach();
                    }
                }
                if self.acquire_deadline.is_some_and(|(held, _)| held == attempt) {
                    self.acquire_deadline = None;
                }
            }
            SessionCommand::PreparePlayback { handle, artifact } => {
                if let Err(e) = self.playback.prepare(handle, &artifact) {
                    tracing::warn!("Failed to prepare preview: {}", e);
                    let _ = self.events_tx.send(SessionEvent::PlaybackFailed {
                        handle,
                        error: e.to_string(),
                    });
                }
            }
            SessionCommand::StartPlayback { handle } => {
                if let Err(e) = self.playback.start(handle) {
                    let _ = self.events_tx.send(SessionEvent::PlaybackFailed {
                        handle,
                        error: e.to_string(),
                    });
                }
            }
            SessionCommand::StopPlayback { handle } => self.playback.stop(handle),
            SessionCommand::ReleasePlayback { handle } => self.playback.release(handle),
            SessionCommand::Upload { artifact } => {
                self.outcome = Some(DriverOutcome::Upload(artifact));
            }
            SessionCommand::Close => {
                if self.outcome.is_none() {
                    self.outcome = Some(DriverOutcome::Closed);
                }
            }
        }
    }

    fn start_recorder(&mut self, attempt: AttemptId, sample_rate: u32) {
        let tap = match &self.tap {
            Some((held, tap)) if *held == attempt => tap.clone(),
            _ => {
                tracing::warn!("No capture stream for attempt {}", attempt);
                let _ = self.events_tx.send(SessionEvent::RecorderFailed {
                    attempt,
                    error: "capture stream missing".to_string(),
                });
                return;
            }
        };

        let started = self
            .recorders
            .create(attempt, sample_rate, self.events_tx.clone())
            .and_then(|mut recorder| {
                recorder.start(&tap)?;
                Ok(recorder)
            });

        match started {
            Ok(recorder) => {
                tracing::info!("Recorder for attempt {} started at {}Hz", attempt, sample_rate);
                self.recorder = Some((attempt, recorder));
            }
            Err(e) => {
                tracing::error!("Failed to start recorder: {}", e);
                let _ = self.events_tx.send(SessionEvent::RecorderFailed {
                    attempt,
                    error: e.to_string(),
                });
            }
        }
    }

    fn check_deadline(&mut self) {
        let Some((attempt, deadline)) = self.acquire_deadline else {
            return;
        };
        let still_waiting = self.session.state() == SessionState::RequestingDevice
            && self.session.active_attempt() == Some(attempt);
        if !still_waiting {
            self.acquire_deadline = None;
        } else if Instant::now() >= deadline {
            self.acquire_deadline = None;
            self.dispatch(SessionEvent::AcquireTimedOut { attempt });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CaptureError, Flash, PlaybackHandle, SessionConfig, TextKey};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Grant {
        Rate(u32),
        Deny,
        Hang,
    }

    struct FakeCapture {
        grant: Grant,
        log: Log,
    }

    impl CaptureProvider for FakeCapture {
        fn request(&mut self, attempt: AttemptId, _tap: PcmTap, events: EventSender) {
            self.log.borrow_mut().push(format!("request {attempt}"));
            match self.grant {
                Grant::Rate(sample_rate) => {
                    let _ = events.send(SessionEvent::DeviceAcquired {
                        attempt,
                        sample_rate,
                    });
                }
                Grant::Deny => {
                    let _ = events.send(SessionEvent::DeviceFailed {
                        attempt,
                        error: CaptureError::PermissionDenied("denied".to_string()),
                    });
                }
                Grant::Hang => {}
            }
        }

        fn release(&mut self, attempt: AttemptId) {
            self.log.borrow_mut().push(format!("release {attempt}"));
        }
    }

    struct FakeRecorder {
        attempt: AttemptId,
        events: EventSender,
        log: Log,
    }

    impl Recorder for FakeRecorder {
        fn start(&mut self, _tap: &PcmTap) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("start {}", self.attempt));
            let _ = self.events.send(SessionEvent::RecorderStarted {
                attempt: self.attempt,
            });
            Ok(())
        }

        fn stop(&mut self) {
            self.log.borrow_mut().push(format!("stop {}", self.attempt));
            let _ = self.events.send(SessionEvent::DataAvailable {
                attempt: self.attempt,
                chunk: b"-tail".to_vec(),
            });
            let _ = self.events.send(SessionEvent::RecorderStopped {
                attempt: self.attempt,
            });
        }

        fn force_stop(&mut self) {
            self.log.borrow_mut().push(format!("force_stop {}", self.attempt));
        }
    }

    struct FakeFactory {
        fail: bool,
        log: Log,
    }

    impl RecorderFactory for FakeFactory {
        fn create(
            &self,
            attempt: AttemptId,
            _sample_rate: u32,
            events: EventSender,
        ) -> anyhow::Result<Box<dyn Recorder>> {
            if self.fail {
                anyhow::bail!("encoder missing");
            }
            Ok(Box::new(FakeRecorder {
                attempt,
                events,
                log: Rc::clone(&self.log),
            }))
        }
    }

    struct FakePlayback {
        log: Log,
        finished: Option<PlaybackStatus>,
    }

    impl PlaybackPort for FakePlayback {
        fn prepare(&mut self, handle: PlaybackHandle, artifact: &RecordingArtifact) -> anyhow::Result<()> {
            self.log
                .borrow_mut()
                .push(format!("prepare {} {}", handle.0, artifact.len()));
            Ok(())
        }

        fn start(&mut self, handle: PlaybackHandle) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("play {}", handle.0));
            Ok(())
        }

        fn stop(&mut self, handle: PlaybackHandle) {
            self.log.borrow_mut().push(format!("pause {}", handle.0));
        }

        fn release(&mut self, handle: PlaybackHandle) {
            self.log.borrow_mut().push(format!("free {}", handle.0));
        }

        fn poll(&mut self) -> Option<PlaybackStatus> {
            self.finished.take()
        }
    }

    fn driver(
        grant: Grant,
        fail_recorder: bool,
        timeout: Option<Duration>,
    ) -> (SessionDriver<FakeCapture, FakeFactory, FakePlayback>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let driver = SessionDriver::new(
            RecordingSession::new(SessionConfig::default()),
            FakeCapture {
                grant,
                log: Rc::clone(&log),
            },
            FakeFactory {
                fail: fail_recorder,
                log: Rc::clone(&log),
            },
            FakePlayback {
                log: Rc::clone(&log),
                finished: None,
            },
            timeout,
        );
        (driver, log)
    }

    #[test]
    fn test_record_stop_upload_flow() {
        let (mut driver, log) = driver(Grant::Rate(48000), false, None);
        driver.dispatch(SessionEvent::Show);
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::Recording);

        driver
            .event_sender()
            .send(SessionEvent::DataAvailable {
                attempt: AttemptId(1),
                chunk: b"voice".to_vec(),
            })
            .unwrap();
        driver.pump();
        driver.dispatch(SessionEvent::StartStop);
        assert_eq!(driver.session().state(), SessionState::Processing);
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::Idle);

        driver.dispatch(SessionEvent::Upload);
        match driver.take_outcome() {
            Some(DriverOutcome::Upload(artifact)) => {
                assert_eq!(artifact.bytes(), b"voice-tail");
                assert_eq!(artifact.file_name(), "recording.mp3");
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(
            *log.borrow(),
            vec![
                "request #1",
                "start #1",
                "stop #1",
                "release #1",
                "prepare 1 10",
                "free 1",
            ]
        );
    }

    #[test]
    fn test_denied_device_sets_flash() {
        let (mut driver, log) = driver(Grant::Deny, false, None);
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::Idle);
        assert_eq!(driver.session().flash(), Some(Flash::error(TextKey::ErrorFailed)));
        assert_eq!(*log.borrow(), vec!["request #1"]);
    }

    #[test]
    fn test_acquire_timeout_releases_device() {
        let (mut driver, log) = driver(Grant::Hang, false, Some(Duration::ZERO));
        driver.dispatch(SessionEvent::StartStop);
        assert_eq!(driver.session().state(), SessionState::RequestingDevice);
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::Idle);
        assert_eq!(driver.session().flash(), Some(Flash::error(TextKey::ErrorFailed)));
        assert_eq!(*log.borrow(), vec!["request #1", "release #1"]);
    }

    #[test]
    fn test_no_timeout_keeps_waiting() {
        let (mut driver, _log) = driver(Grant::Hang, false, None);
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::RequestingDevice);
    }

    #[test]
    fn test_recorder_creation_failure() {
        let (mut driver, log) = driver(Grant::Rate(16000), true, None);
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::Idle);
        assert_eq!(driver.session().flash(), Some(Flash::error(TextKey::ErrorRecorder)));
        assert_eq!(*log.borrow(), vec!["request #1", "release #1"]);
    }

    #[test]
    fn test_cancel_force_stops_recorder() {
        let (mut driver, log) = driver(Grant::Rate(16000), false, None);
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        driver.dispatch(SessionEvent::Cancel);
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::Idle);
        assert!(!driver.session().has_recording());
        assert_eq!(
            *log.borrow(),
            vec!["request #1", "start #1", "force_stop #1", "release #1"]
        );
    }

    #[test]
    fn test_playback_end_is_polled() {
        let (mut driver, log) = driver(Grant::Rate(16000), false, None);
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        driver.dispatch(SessionEvent::TogglePlayback);
        assert_eq!(driver.session().state(), SessionState::Playing);

        driver.playback.finished = Some(PlaybackStatus::Ended(PlaybackHandle(1)));
        driver.pump();
        assert_eq!(driver.session().state(), SessionState::Idle);
        assert!(log.borrow().contains(&"play 1".to_string()));
    }

    #[test]
    fn test_shutdown_mid_recording_releases_capture() {
        let (mut driver, log) = driver(Grant::Rate(16000), false, None);
        driver.dispatch(SessionEvent::StartStop);
        driver.pump();
        driver.shutdown();
        assert_eq!(driver.take_outcome(), Some(DriverOutcome::Closed));
        assert_eq!(
            *log.borrow(),
            vec!["request #1", "start #1", "force_stop #1", "release #1"]
        );
    }
}
