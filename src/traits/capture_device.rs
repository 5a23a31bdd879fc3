use crate::models::error::RecorderError;

/// Interface for platform-specific audio capture sources.
///
/// The capture loop pulls fixed-size frames in a tight loop on its own
/// thread, so `read_frame` may block until a frame is available. Platform
/// backends (ALSA, WASAPI, Core Audio) implement this; tests inject
/// scripted doubles.
pub trait CaptureDevice: Send {
    /// Whether this capture source is currently available.
    fn is_available(&self) -> bool;

    /// Native sample rate of the device in Hz.
    fn sample_rate(&self) -> u32;

    /// Blocking read of up to one frame of 16-bit PCM samples into `buf`.
    ///
    /// Returns the number of samples written; `Ok(0)` means no data was
    /// ready this round (the loop yields and retries). An `Err` is an
    /// unrecoverable device failure and terminates the capture loop.
    fn read_frame(&mut self, buf: &mut [i16]) -> Result<usize, RecorderError>;
}
