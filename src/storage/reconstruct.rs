use std::fs;
use std::io::Write;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use zeroize::{Zeroize, Zeroizing};

use crate::keys::SessionDataKey;
use crate::models::artifacts::SegmentHandle;
use crate::models::error::RecorderError;
use crate::storage::stream_cipher::{GCM_NONCE_LEN, GCM_TAG_LEN};

/// Decrypts finalized segments back into one contiguous plaintext stream,
/// verifying each segment's authentication tag along the way.
///
/// Keyed once from the unwrapped session key; the key bytes live only in
/// the cipher's key schedule.
pub struct Reconstructor {
    cipher: Aes256Gcm,
}

impl Reconstructor {
    pub fn new(dek: &SessionDataKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(GenericArray::from_slice(dek.expose())),
        }
    }

    /// Decrypt the segments in ascending sequence order and concatenate the
    /// verified plaintext.
    ///
    /// Aborts with `IntegrityFailure` naming the offending segment if any
    /// tag check fails; no partial stream is returned. `InvalidState` if
    /// the list is not strictly increasing by sequence — ordering comes
    /// from the session's segment list, never from filenames or timestamps.
    pub fn reconstruct(&self, segments: &[SegmentHandle]) -> Result<Vec<u8>, RecorderError> {
        let mut out = Vec::new();
        self.reconstruct_into(segments, &mut out)?;
        Ok(out)
    }

    /// Streaming variant: each segment is fully decrypted and verified
    /// before any of its bytes reach `sink`, so the sink only ever sees
    /// authenticated plaintext. A failure aborts before the offending
    /// segment is written.
    pub fn reconstruct_into(
        &self,
        segments: &[SegmentHandle],
        sink: &mut dyn Write,
    ) -> Result<(), RecorderError> {
        check_order(segments)?;
        for segment in segments {
            let plain = self.decrypt_segment(segment)?;
            sink.write_all(&plain)
                .map_err(|e| RecorderError::StorageError(format!("failed to write plaintext: {e}")))?;
        }
        Ok(())
    }

    /// Decrypt-and-verify one segment without retaining the plaintext.
    /// Pre-flight check before attempting a full reconstruction.
    ///
    /// `Ok(false)` on tag mismatch or truncation; `Err` only for I/O
    /// failures reading the file.
    pub fn validate_segment(&self, segment: &SegmentHandle) -> Result<bool, RecorderError> {
        match self.decrypt_segment(segment) {
            Ok(_) => Ok(true),
            Err(RecorderError::IntegrityFailure { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn decrypt_segment(&self, segment: &SegmentHandle) -> Result<Zeroizing<Vec<u8>>, RecorderError> {
        let mut data = fs::read(&segment.path)
            .map_err(|e| RecorderError::StorageError(format!("failed to read segment {}: {e}", segment.sequence)))?;

        if data.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            data.zeroize();
            return Err(RecorderError::integrity_in(segment.sequence));
        }

        let (nonce, body) = data.split_at(GCM_NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map(Zeroizing::new)
            .map_err(|_| RecorderError::integrity_in(segment.sequence));
        data.zeroize();
        plain
    }
}

fn check_order(segments: &[SegmentHandle]) -> Result<(), RecorderError> {
    for pair in segments.windows(2) {
        if pair[1].sequence <= pair[0].sequence {
            return Err(RecorderError::invalid_state(format!(
                "segments out of order: {} follows {}",
                pair[1].sequence, pair[0].sequence
            )));
        }
    }
    Ok(())
}
