use thiserror::Error;

/// Errors that can occur across the recording pipeline.
///
/// One variant per failure class; `String` payloads carry context for
/// logging, never secret material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    /// The master key requires a fresh user-presence proof. Recoverable:
    /// prompt for authentication and retry the same operation.
    #[error("user authentication required before master key use")]
    AuthenticationRequired,

    /// The hardware-backed key store could not be opened. Typically fatal
    /// for the session.
    #[error("secure key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// An authentication tag failed to verify during key unwrap or segment
    /// decryption. Never tolerated silently; the affected operation aborts.
    #[error("integrity check failed{}", .sequence.map(|s| format!(" for segment {s}")).unwrap_or_default())]
    IntegrityFailure { sequence: Option<u64> },

    /// Rejected configuration values, detected when the recorder is built.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation invoked in a state that forbids it. A sequencing error in
    /// the caller, not a data-loss condition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// `start()` called while a session is already active.
    #[error("a recording session is already active")]
    AlreadyRecording,

    /// `stop()` found neither segments nor a session key to hand off.
    #[error("no segments and no session key exist for this session")]
    NoActiveSegments,

    /// The capture device failed to deliver audio.
    #[error("capture device failure: {0}")]
    DeviceFailure(String),

    /// Unexpected cipher-library failure.
    #[error("cryptographic operation failed: {0}")]
    CryptoFailure(String),

    /// Filesystem failure while writing, reading, or erasing segments.
    #[error("storage error: {0}")]
    StorageError(String),
}

impl RecorderError {
    /// Integrity failure not tied to a particular segment (e.g. key unwrap).
    pub fn integrity() -> Self {
        Self::IntegrityFailure { sequence: None }
    }

    /// Integrity failure attributed to one segment's sequence number.
    pub fn integrity_in(sequence: u64) -> Self {
        Self::IntegrityFailure {
            sequence: Some(sequence),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_display_names_segment() {
        assert!(RecorderError::integrity_in(7).to_string().contains("segment 7"));
        assert_eq!(RecorderError::integrity().to_string(), "integrity check failed");
    }
}
