/// One throttled amplitude reading, derived from the peak absolute sample
/// value since the previous reading. Ephemeral: drives a live meter, never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeSample {
    /// Normalized peak in `0.0..=1.0`.
    pub peak: f32,
}

/// Observer for the live amplitude stream.
///
/// Called from the capture thread at most once per configured interval
/// (≤ 10 Hz by default), fire-and-forget. Keep implementations brief; long
/// work here stalls metering, though never encryption.
pub trait AmplitudeObserver: Send + Sync {
    fn on_amplitude(&self, sample: AmplitudeSample);
}
