use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::keys::hierarchy::KeyHierarchy;
use crate::models::artifacts::SessionArtifacts;
use crate::models::config::RecorderConfig;
use crate::models::error::RecorderError;
use crate::models::state::RecorderState;
use crate::session::worker::{spawn_capture_loop, CaptureShared, LoopParams};
use crate::storage::erase::{erase_all, remove_session_dir};
use crate::storage::segment_writer::SegmentCipherWriter;
use crate::traits::amplitude::AmplitudeObserver;
use crate::traits::capture_device::CaptureDevice;

/// Produces a fresh capture device for each recording attempt.
pub type DeviceFactory =
    Box<dyn Fn() -> Result<Box<dyn CaptureDevice>, RecorderError> + Send + Sync>;

/// Counters mirroring the capture thread's progress, for hosts and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderDiagnostics {
    pub frames_captured: u64,
    pub segments_finalized: u64,
    /// True once the capture thread has exited and dropped the session key.
    /// After stop/cancel this attests that no live key reference remains.
    pub session_key_released: bool,
}

/// One in-flight recording attempt.
struct ActiveSession {
    shared: Arc<CaptureShared>,
    handle: Option<JoinHandle<()>>,
    wrapped_key: Option<crate::keys::WrappedKey>,
    session_dir: std::path::PathBuf,
    started_at: Instant,
    paused_duration: Duration,
    pause_started: Option<Instant>,
}

impl ActiveSession {
    fn elapsed(&self) -> Duration {
        let mut paused = self.paused_duration;
        if let Some(since) = self.pause_started {
            paused += since.elapsed();
        }
        self.started_at.elapsed().saturating_sub(paused)
    }
}

struct RecorderInner {
    state: RecorderState,
    session: Option<ActiveSession>,
    /// Frozen duration of the most recently stopped session.
    last_duration: Duration,
    /// Failure recorded by the most recent session's capture loop.
    last_failure: Option<RecorderError>,
    /// Final counters of the most recently torn-down session.
    last_diagnostics: RecorderDiagnostics,
}

/// Orchestrator for one recording session at a time; the sole component
/// external collaborators talk to.
///
/// All public operations serialize through one internal mutex, so no state
/// transition is ever evaluated against a stale read: concurrent calls
/// cannot race two `stop()`s into finalizing the same segment twice.
pub struct SessionRecorder {
    config: RecorderConfig,
    keys: KeyHierarchy,
    device_factory: DeviceFactory,
    observer: Mutex<Option<Arc<dyn AmplitudeObserver>>>,
    inner: Mutex<RecorderInner>,
}

impl std::fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionRecorder {
    pub fn new(
        config: RecorderConfig,
        keys: KeyHierarchy,
        device_factory: DeviceFactory,
    ) -> Result<Self, RecorderError> {
        config
            .validate()
            .map_err(RecorderError::InvalidConfig)?;
        Ok(Self {
            config,
            keys,
            device_factory,
            observer: Mutex::new(None),
            inner: Mutex::new(RecorderInner {
                state: RecorderState::Idle,
                session: None,
                last_duration: Duration::ZERO,
                last_failure: None,
                last_diagnostics: RecorderDiagnostics::default(),
            }),
        })
    }

    /// Begin a new recording session.
    ///
    /// Generates and wraps a fresh session key, opens segment 0, and starts
    /// the capture thread. A key failure (`AuthenticationRequired`,
    /// `KeyStoreUnavailable`) leaves no partial state: the caller may
    /// re-prompt and call `start()` again.
    pub fn start(&self) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        if !inner.state.is_idle() {
            return Err(RecorderError::AlreadyRecording);
        }

        let dek = self.keys.generate_session_key();
        let wrapped_key = self.keys.wrap_session_key(&dek)?;

        let session_dir = self
            .config
            .segment_dir
            .join(format!("session_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&session_dir)
            .map_err(|e| RecorderError::StorageError(format!("failed to create session directory: {e}")))?;

        // The writer takes the key; from here on it is the only holder.
        let mut writer = SegmentCipherWriter::new(session_dir.clone(), dek);
        if let Err(e) = writer.open_new_segment() {
            drop(writer);
            remove_session_dir(&session_dir);
            return Err(e);
        }

        let device = match (self.device_factory)() {
            Ok(d) => d,
            Err(e) => {
                writer.abort_segment();
                drop(writer);
                remove_session_dir(&session_dir);
                return Err(e);
            }
        };
        if !device.is_available() {
            writer.abort_segment();
            drop(writer);
            remove_session_dir(&session_dir);
            return Err(RecorderError::DeviceFailure(
                "capture device is not available".into(),
            ));
        }
        if device.sample_rate() != self.config.sample_rate {
            let err = RecorderError::DeviceFailure(format!(
                "device sample rate {} Hz does not match configured {} Hz",
                device.sample_rate(),
                self.config.sample_rate
            ));
            writer.abort_segment();
            drop(writer);
            remove_session_dir(&session_dir);
            return Err(err);
        }

        let shared = Arc::new(CaptureShared::new());
        *shared.observer.lock() = self.observer.lock().clone();

        let params = LoopParams {
            // Interleaved samples per frame across all channels.
            frame_samples: self.config.frame_samples * usize::from(self.config.channels),
            chunks_per_segment: self.config.chunks_per_segment,
            amplitude_interval: self.config.amplitude_interval,
        };
        let handle = match spawn_capture_loop(Arc::clone(&shared), device, writer, params) {
            Ok(h) => h,
            Err(e) => {
                // Writer was consumed by the failed spawn attempt and
                // dropped with it; only the directory remains.
                remove_session_dir(&session_dir);
                return Err(e);
            }
        };

        inner.session = Some(ActiveSession {
            shared,
            handle: Some(handle),
            wrapped_key: Some(wrapped_key),
            session_dir,
            started_at: Instant::now(),
            paused_duration: Duration::ZERO,
            pause_started: None,
        });
        inner.last_failure = None;
        inner.state = RecorderState::Recording;
        log::debug!("recording session started");
        Ok(())
    }

    /// Suspend capture without ending the session. Valid only while
    /// Recording.
    pub fn pause(&self) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        if let Some(failure) = Self::absorb_failure(&mut inner) {
            return Err(failure);
        }
        if !inner.state.is_recording() {
            return Err(RecorderError::invalid_state("pause requires an active recording"));
        }
        let session = inner.session.as_mut().ok_or_else(session_missing)?;
        session.pause_started = Some(Instant::now());
        session.shared.paused.store(true, Ordering::SeqCst);
        inner.state = RecorderState::Paused;
        Ok(())
    }

    /// Resume a paused session. Valid only while Paused.
    pub fn resume(&self) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        if let Some(failure) = Self::absorb_failure(&mut inner) {
            return Err(failure);
        }
        if !inner.state.is_paused() {
            return Err(RecorderError::invalid_state("resume requires a paused recording"));
        }
        let session = inner.session.as_mut().ok_or_else(session_missing)?;
        if let Some(since) = session.pause_started.take() {
            session.paused_duration += since.elapsed();
        }
        session.shared.paused.store(false, Ordering::SeqCst);
        inner.state = RecorderState::Recording;
        Ok(())
    }

    /// End the session and hand off its artifacts: the ordered segment
    /// list plus the wrapped session key.
    ///
    /// Valid from Recording, Paused, or Failed. After a mid-capture
    /// failure this still returns whatever segments were finalized before
    /// the failure (possibly none); the failure itself remains readable
    /// via [`last_failure`](Self::last_failure). The plaintext session key
    /// is zeroed during teardown.
    pub fn stop(&self) -> Result<SessionArtifacts, RecorderError> {
        let mut inner = self.inner.lock();
        Self::absorb_failure(&mut inner);
        if !inner.state.is_active() {
            return Err(RecorderError::invalid_state("stop requires an active session"));
        }
        inner.state = RecorderState::Stopping;

        let Some(mut session) = inner.session.take() else {
            inner.state = RecorderState::Idle;
            return Err(RecorderError::NoActiveSegments);
        };

        let duration = session.elapsed();
        Self::shutdown_loop(&mut session, self.config.join_timeout);
        inner.last_diagnostics = Self::snapshot(&session.shared);

        let segments = std::mem::take(&mut *session.shared.segments.lock());
        inner.last_failure = session.shared.failure.lock().take();
        inner.last_duration = duration;
        inner.state = RecorderState::Idle;

        let Some(wrapped_key) = session.wrapped_key.take() else {
            // Nothing usable survived; treat as "nothing to submit".
            return Err(RecorderError::NoActiveSegments);
        };

        log::debug!(
            "recording session stopped: {} segment(s), {:.1}s",
            segments.len(),
            duration.as_secs_f64()
        );
        Ok(SessionArtifacts::new(segments, wrapped_key, duration.as_secs_f64()))
    }

    /// Abort the session and destroy everything it produced.
    ///
    /// The required recovery path for OS-level interruption: never fails,
    /// never blocks longer than the bounded join, and always returns the
    /// recorder to Idle with no segment files on disk and the session key
    /// zeroed. A no-op when already Idle.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        if inner.state.is_idle() {
            return;
        }
        inner.state = RecorderState::Stopping;

        if let Some(mut session) = inner.session.take() {
            Self::shutdown_loop(&mut session, self.config.join_timeout);
            inner.last_diagnostics = Self::snapshot(&session.shared);

            let segments = std::mem::take(&mut *session.shared.segments.lock());
            erase_all(&segments);
            remove_session_dir(&session.session_dir);
            inner.last_failure = session.shared.failure.lock().take();
            // Wrapped key is discarded with the session.
        }

        inner.last_duration = Duration::ZERO;
        inner.state = RecorderState::Idle;
        log::debug!("recording session cancelled");
    }

    /// Active recording time: zero before the first start, running time
    /// minus paused intervals while active, and the frozen final duration
    /// after stop.
    pub fn elapsed(&self) -> Duration {
        let inner = self.inner.lock();
        match &inner.session {
            Some(session) => session.elapsed(),
            None => inner.last_duration,
        }
    }

    /// Current state, reflecting any capture-loop failure observed since
    /// the last call.
    pub fn state(&self) -> RecorderState {
        let mut inner = self.inner.lock();
        Self::absorb_failure(&mut inner);
        inner.state
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    /// The failure that ended the current or most recent session, if any.
    pub fn last_failure(&self) -> Option<RecorderError> {
        let mut inner = self.inner.lock();
        Self::absorb_failure(&mut inner);
        if let Some(session) = &inner.session {
            return session.shared.failure.lock().clone();
        }
        inner.last_failure.clone()
    }

    /// Attach or detach the live amplitude observer. Safe at any time;
    /// applies to the active session immediately and to future sessions.
    pub fn set_amplitude_observer(&self, observer: Option<Arc<dyn AmplitudeObserver>>) {
        *self.observer.lock() = observer.clone();
        let inner = self.inner.lock();
        if let Some(session) = &inner.session {
            *session.shared.observer.lock() = observer;
        }
    }

    pub fn diagnostics(&self) -> RecorderDiagnostics {
        let inner = self.inner.lock();
        match &inner.session {
            Some(session) => Self::snapshot(&session.shared),
            None => inner.last_diagnostics,
        }
    }

    fn snapshot(shared: &CaptureShared) -> RecorderDiagnostics {
        RecorderDiagnostics {
            frames_captured: shared.frames_captured.load(Ordering::SeqCst),
            segments_finalized: shared.segments_finalized.load(Ordering::SeqCst),
            session_key_released: shared.key_released.load(Ordering::SeqCst),
        }
    }

    /// Transition to Failed if the capture loop has reported an error the
    /// recorder has not yet observed; returns the error for the caller.
    fn absorb_failure(inner: &mut RecorderInner) -> Option<RecorderError> {
        let failed = inner
            .session
            .as_ref()
            .is_some_and(|s| s.shared.failed.load(Ordering::SeqCst));
        if !failed {
            return None;
        }
        if !inner.state.is_failed() {
            log::warn!("capture loop reported a failure; session marked failed");
            inner.state = RecorderState::Failed;
        }
        inner
            .session
            .as_ref()
            .and_then(|s| s.shared.failure.lock().clone())
    }

    /// Signal the loop to exit and join it under a bounded timeout. A
    /// thread that fails to exit in time is logged as an anomaly and
    /// detached; teardown must not hang the caller.
    fn shutdown_loop(session: &mut ActiveSession, timeout: Duration) {
        session.shared.signal_stop();
        let Some(handle) = session.handle.take() else {
            return;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("capture thread panicked during shutdown");
            }
        } else {
            log::warn!("capture thread did not exit within {timeout:?}; detaching");
        }
    }
}

fn session_missing() -> RecorderError {
    RecorderError::invalid_state("internal: active state without a session")
}
