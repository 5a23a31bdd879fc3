use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use zeroize::Zeroize;

use crate::models::artifacts::SegmentHandle;
use crate::models::error::RecorderError;
use crate::storage::segment_writer::SegmentCipherWriter;
use crate::traits::amplitude::{AmplitudeObserver, AmplitudeSample};
use crate::traits::capture_device::CaptureDevice;

/// How long the loop sleeps while paused or when the device has no data.
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// State shared between the capture thread and the recorder.
///
/// The atomics carry control signals; the mutexes hold the finalized
/// segment list, the failure slot, and the amplitude observer. The capture
/// thread never touches recorder state directly.
pub(crate) struct CaptureShared {
    pub(crate) running: AtomicBool,
    pub(crate) paused: AtomicBool,
    pub(crate) failed: AtomicBool,
    /// Finalized segments, appended strictly in sequence order.
    pub(crate) segments: Mutex<Vec<SegmentHandle>>,
    pub(crate) failure: Mutex<Option<RecorderError>>,
    pub(crate) observer: Mutex<Option<Arc<dyn AmplitudeObserver>>>,
    pub(crate) frames_captured: AtomicU64,
    pub(crate) segments_finalized: AtomicU64,
    /// Set once the capture thread has exited and dropped the writer, and
    /// with it the session key.
    pub(crate) key_released: AtomicBool,
}

impl CaptureShared {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            segments: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            observer: Mutex::new(None),
            frames_captured: AtomicU64::new(0),
            segments_finalized: AtomicU64::new(0),
            key_released: AtomicBool::new(false),
        }
    }

    pub(crate) fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Parameters the loop needs from the recorder's configuration.
pub(crate) struct LoopParams {
    pub frame_samples: usize,
    pub chunks_per_segment: u32,
    pub amplitude_interval: Duration,
}

/// Spawn the dedicated capture thread.
///
/// The thread owns the device and the segment writer (and with it the
/// session key) until it exits; the writer's drop zeroes the key.
pub(crate) fn spawn_capture_loop(
    shared: Arc<CaptureShared>,
    device: Box<dyn CaptureDevice>,
    writer: SegmentCipherWriter,
    params: LoopParams,
) -> Result<thread::JoinHandle<()>, RecorderError> {
    thread::Builder::new()
        .name("capture-loop".into())
        .spawn(move || run_capture_loop(shared, device, writer, params))
        .map_err(|e| RecorderError::DeviceFailure(format!("failed to spawn capture thread: {e}")))
}

fn run_capture_loop(
    shared: Arc<CaptureShared>,
    mut device: Box<dyn CaptureDevice>,
    mut writer: SegmentCipherWriter,
    params: LoopParams,
) {
    let mut frame = vec![0i16; params.frame_samples];
    let mut frame_bytes = vec![0u8; params.frame_samples * 2];
    let mut peak_max = 0.0f32;
    let mut last_emit = Instant::now();

    while shared.running.load(Ordering::SeqCst) {
        if shared.paused.load(Ordering::SeqCst) {
            // No device reads and no encryption while paused.
            thread::sleep(IDLE_WAIT);
            continue;
        }

        // Clamp: a misbehaving device may report more samples than fit.
        let samples = match device.read_frame(&mut frame) {
            Ok(n) => n.min(frame.len()),
            Err(e) => {
                fail(&shared, &mut writer, e);
                break;
            }
        };
        if samples == 0 {
            thread::sleep(IDLE_WAIT);
            continue;
        }

        // Rotate before encrypting the pending frame so no frame is lost
        // or split across segments.
        if writer.chunks_in_open_segment() >= params.chunks_per_segment {
            match writer.finalize_segment() {
                Ok(handle) => {
                    shared.segments.lock().push(handle);
                    shared.segments_finalized.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    fail(&shared, &mut writer, e);
                    break;
                }
            }
            if let Err(e) = writer.open_new_segment() {
                fail(&shared, &mut writer, e);
                break;
            }
        }

        let byte_len = samples * 2;
        for (dst, sample) in frame_bytes[..byte_len].chunks_exact_mut(2).zip(&frame[..samples]) {
            dst.copy_from_slice(&sample.to_le_bytes());
        }
        if let Err(e) = writer.encrypt_chunk(&frame_bytes[..byte_len]) {
            fail(&shared, &mut writer, e);
            break;
        }
        shared.frames_captured.fetch_add(1, Ordering::SeqCst);

        let peak = frame[..samples]
            .iter()
            .map(|s| f32::from(s.unsigned_abs()) / 32768.0)
            .fold(0.0f32, f32::max);
        peak_max = peak_max.max(peak);

        if last_emit.elapsed() >= params.amplitude_interval {
            let observer = shared.observer.lock().clone();
            if let Some(observer) = observer {
                observer.on_amplitude(AmplitudeSample { peak: peak_max });
            }
            peak_max = 0.0;
            last_emit = Instant::now();
        }
    }

    // Stop path: seal the open segment so its audio is not lost. After a
    // failure the open segment was already aborted and erased.
    if !shared.failed.load(Ordering::SeqCst) && writer.has_open_segment() {
        match writer.finalize_segment() {
            Ok(handle) => {
                shared.segments.lock().push(handle);
                shared.segments_finalized.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                log::error!("failed to finalize last segment on stop: {e}");
                writer.abort_segment();
                *shared.failure.lock() = Some(e);
                shared.failed.store(true, Ordering::SeqCst);
            }
        }
    }

    // Plaintext hygiene: the reusable frame buffers held raw audio.
    frame.zeroize();
    frame_bytes.zeroize();
    // Dropping the writer zeroes the session key; the flag lets the
    // recorder attest that no live key reference remains.
    drop(writer);
    shared.key_released.store(true, Ordering::SeqCst);
}

/// Record the error, abort the partial segment, and stop the loop. The
/// failure is surfaced to the recorder on its next observed operation;
/// audio is never dropped silently.
fn fail(shared: &CaptureShared, writer: &mut SegmentCipherWriter, error: RecorderError) {
    log::error!("capture loop failure: {error}");
    writer.abort_segment();
    *shared.failure.lock() = Some(error);
    shared.failed.store(true, Ordering::SeqCst);
    shared.running.store(false, Ordering::SeqCst);
}
