use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::keys::WrappedKey;

/// Reference to one finalized, immutable segment file.
///
/// File layout (bit-exact): `[12-byte nonce][ciphertext][16-byte tag]`,
/// where ciphertext length equals the plaintext frame bytes fed to the
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHandle {
    /// Monotonically increasing sequence number assigned at creation,
    /// starting at 0 within a session.
    pub sequence: u64,
    pub path: PathBuf,
    /// Ciphertext byte count (excludes nonce and tag).
    pub ciphertext_len: u64,
}

/// Everything a successful `stop()` hands to the caller.
///
/// These are the only values that may be persisted or transmitted: opaque
/// segment references plus the wrapped session key. The plaintext session
/// key is already zeroed by the time this struct exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArtifacts {
    pub id: String,
    pub created_at: String,
    /// Finalized segments in ascending sequence order.
    pub segments: Vec<SegmentHandle>,
    pub wrapped_key: WrappedKey,
    pub duration_secs: f64,
}

impl SessionArtifacts {
    pub fn new(segments: Vec<SegmentHandle>, wrapped_key: WrappedKey, duration_secs: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            segments,
            wrapped_key,
            duration_secs,
        }
    }

    /// True when the session produced no audio at all (valid empty recording).
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
