use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a recording session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Capture sample rate in Hz (default: 16000). Must match the device's
    /// native rate; `start()` rejects a mismatched device.
    pub sample_rate: u32,

    /// Number of capture channels (default: 1). Valid values: 1, 2. The
    /// capture frame buffer holds `frame_samples * channels` interleaved
    /// samples.
    pub channels: u16,

    /// Samples per channel per frame pulled from the device (default:
    /// 1600, i.e. 100 ms at 16 kHz).
    pub frame_samples: usize,

    /// Frames encrypted into one segment before rotation (default: 300,
    /// roughly 30 s per segment at the default frame size). Bounds the
    /// cipher state and pending ciphertext resident in memory regardless
    /// of total session length.
    pub chunks_per_segment: u32,

    /// Directory under which per-session segment directories are created.
    pub segment_dir: PathBuf,

    /// How long stop()/cancel() wait for the capture thread to exit before
    /// logging an anomaly and proceeding.
    pub join_timeout: Duration,

    /// Minimum interval between amplitude samples delivered to an observer.
    pub amplitude_interval: Duration,
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.frame_samples == 0 {
            return Err("frame size must be positive".into());
        }
        if self.chunks_per_segment == 0 {
            return Err("segment rotation threshold must be positive".into());
        }
        Ok(())
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_samples: 1600,
            chunks_per_segment: 300,
            segment_dir: PathBuf::from("."),
            join_timeout: Duration::from_secs(1),
            amplitude_interval: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RecorderConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_rotation_threshold() {
        let config = RecorderConfig {
            chunks_per_segment: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_channel_count() {
        let config = RecorderConfig {
            channels: 6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
