use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use zeroize::Zeroize;

use crate::keys::SessionDataKey;
use crate::models::artifacts::SegmentHandle;
use crate::models::error::RecorderError;
use crate::storage::erase::secure_erase;
use crate::storage::stream_cipher::{SegmentStreamCipher, GCM_NONCE_LEN};

/// Streaming writer producing authenticated-encryption-framed segment files.
///
/// Owns the session key for its lifetime (zeroed when the writer drops) and
/// at most one open segment at a time. Segment file layout:
///
/// ```text
/// [12-byte nonce][ciphertext][16-byte GCM tag]
/// ```
///
/// Ciphertext reaches the file the moment a chunk is encrypted; plaintext
/// never touches storage.
pub struct SegmentCipherWriter {
    dir: PathBuf,
    dek: SessionDataKey,
    next_sequence: u64,
    open: Option<OpenSegment>,
    /// Reused per-chunk buffer; holds plaintext briefly, zeroized after
    /// every write.
    scratch: Vec<u8>,
}

struct OpenSegment {
    sequence: u64,
    path: PathBuf,
    file: File,
    cipher: SegmentStreamCipher,
    chunks: u32,
}

impl SegmentCipherWriter {
    /// The writer takes ownership of the session key; it is the last
    /// component to hold the plaintext key during recording.
    pub fn new(dir: PathBuf, dek: SessionDataKey) -> Self {
        Self {
            dir,
            dek,
            next_sequence: 0,
            open: None,
            scratch: Vec::new(),
        }
    }

    /// Allocate the next segment file: write a fresh random nonce as its
    /// first bytes and initialize the streaming cipher.
    ///
    /// Returns the new segment's sequence number. `InvalidState` if a
    /// segment is already open.
    pub fn open_new_segment(&mut self) -> Result<u64, RecorderError> {
        if self.open.is_some() {
            return Err(RecorderError::invalid_state(
                "cannot open a segment while another is open",
            ));
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| RecorderError::StorageError(format!("failed to create segment directory: {e}")))?;

        let sequence = self.next_sequence;
        let path = self.dir.join(format!("segment_{sequence:05}.aseg"));

        let mut nonce = [0u8; GCM_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut file = File::create(&path)
            .map_err(|e| RecorderError::StorageError(format!("failed to create segment file: {e}")))?;
        file.write_all(&nonce)
            .map_err(|e| RecorderError::StorageError(format!("failed to write segment nonce: {e}")))?;

        let cipher = SegmentStreamCipher::new(self.dek.expose(), &nonce);

        self.open = Some(OpenSegment {
            sequence,
            path,
            file,
            cipher,
            chunks: 0,
        });
        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Encrypt one chunk of raw PCM bytes and append the ciphertext to the
    /// open segment file. Does not finalize.
    pub fn encrypt_chunk(&mut self, frame: &[u8]) -> Result<(), RecorderError> {
        let segment = self
            .open
            .as_mut()
            .ok_or_else(|| RecorderError::invalid_state("no open segment to encrypt into"))?;

        self.scratch.clear();
        self.scratch.extend_from_slice(frame);
        segment.cipher.encrypt_in_place(&mut self.scratch);

        let written = segment.file.write_all(&self.scratch);
        self.scratch.zeroize();
        written.map_err(|e| RecorderError::StorageError(format!("failed to write ciphertext: {e}")))?;

        segment.chunks += 1;
        Ok(())
    }

    /// Append the authentication tag, close the file, and return the handle
    /// of the now-immutable segment. `InvalidState` when no segment is open
    /// (finalize is not idempotent).
    pub fn finalize_segment(&mut self) -> Result<SegmentHandle, RecorderError> {
        let OpenSegment {
            sequence,
            path,
            mut file,
            cipher,
            ..
        } = self
            .open
            .take()
            .ok_or_else(|| RecorderError::invalid_state("no open segment to finalize"))?;

        let ciphertext_len = cipher.ciphertext_len();
        let tag = cipher.finalize();
        file.write_all(&tag)
            .map_err(|e| RecorderError::StorageError(format!("failed to write segment tag: {e}")))?;
        file.sync_all()
            .map_err(|e| RecorderError::StorageError(format!("failed to sync segment: {e}")))?;

        Ok(SegmentHandle {
            sequence,
            path,
            ciphertext_len,
        })
    }

    /// Drop the open segment without a tag and erase its partial file.
    /// Used on mid-segment failure so no unverifiable ciphertext survives.
    /// No-op when nothing is open.
    pub fn abort_segment(&mut self) {
        if let Some(segment) = self.open.take() {
            drop(segment.file);
            if let Err(e) = secure_erase(&segment.path) {
                log::warn!("failed to erase aborted segment {}: {e}", segment.sequence);
            }
        }
    }

    pub fn has_open_segment(&self) -> bool {
        self.open.is_some()
    }

    /// Chunks encrypted into the currently-open segment (0 when none open).
    pub fn chunks_in_open_segment(&self) -> u32 {
        self.open.as_ref().map(|s| s.chunks).unwrap_or(0)
    }

    /// Segments opened so far, i.e. the sequence the next open will use.
    pub fn segments_opened(&self) -> u64 {
        self.next_sequence
    }
}

impl Drop for SegmentCipherWriter {
    fn drop(&mut self) {
        // A still-open segment at drop means an abnormal teardown path.
        if self.open.is_some() {
            log::warn!("segment writer dropped with an open segment; aborting it");
            self.abort_segment();
        }
        self.scratch.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::generic_array::GenericArray;
    use aes_gcm::aead::Aead;
    use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
    use std::path::Path;

    use crate::storage::stream_cipher::GCM_TAG_LEN;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("secure_capture_writer_{}_{}", name, uuid::Uuid::new_v4()))
    }

    fn decrypt_segment(path: &Path, dek: &SessionDataKey) -> Vec<u8> {
        let data = fs::read(path).unwrap();
        let cipher = Aes256Gcm::new(GenericArray::from_slice(dek.expose()));
        let (nonce, body) = data.split_at(GCM_NONCE_LEN);
        cipher.decrypt(Nonce::from_slice(nonce), body).unwrap()
    }

    fn clone_key(dek: &SessionDataKey) -> SessionDataKey {
        SessionDataKey::from_bytes(zeroize::Zeroizing::new(*dek.expose()))
    }

    #[test]
    fn segment_file_layout_is_nonce_ciphertext_tag() {
        let dir = temp_dir("layout");
        let dek = SessionDataKey::generate();
        let verify_key = clone_key(&dek);
        let mut writer = SegmentCipherWriter::new(dir.clone(), dek);

        writer.open_new_segment().unwrap();
        writer.encrypt_chunk(&[1u8; 100]).unwrap();
        writer.encrypt_chunk(&[2u8; 60]).unwrap();
        let handle = writer.finalize_segment().unwrap();

        assert_eq!(handle.sequence, 0);
        assert_eq!(handle.ciphertext_len, 160);
        let file_len = fs::metadata(&handle.path).unwrap().len();
        assert_eq!(file_len, (GCM_NONCE_LEN + 160 + GCM_TAG_LEN) as u64);

        let plain = decrypt_segment(&handle.path, &verify_key);
        let mut expected = vec![1u8; 100];
        expected.extend_from_slice(&[2u8; 60]);
        assert_eq!(plain, expected);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn double_open_is_invalid_state() {
        let dir = temp_dir("double_open");
        let mut writer = SegmentCipherWriter::new(dir.clone(), SessionDataKey::generate());
        writer.open_new_segment().unwrap();
        assert!(matches!(
            writer.open_new_segment(),
            Err(RecorderError::InvalidState(_))
        ));
        writer.abort_segment();
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn finalize_without_open_segment_is_invalid_state() {
        let dir = temp_dir("no_open");
        let mut writer = SegmentCipherWriter::new(dir.clone(), SessionDataKey::generate());
        assert!(matches!(
            writer.finalize_segment(),
            Err(RecorderError::InvalidState(_))
        ));

        writer.open_new_segment().unwrap();
        writer.finalize_segment().unwrap();
        // Finalize is not idempotent: the second call reports, not crashes.
        assert!(matches!(
            writer.finalize_segment(),
            Err(RecorderError::InvalidState(_))
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sequence_numbers_increase_monotonically() {
        let dir = temp_dir("sequence");
        let mut writer = SegmentCipherWriter::new(dir.clone(), SessionDataKey::generate());
        for expected in 0..3u64 {
            let seq = writer.open_new_segment().unwrap();
            assert_eq!(seq, expected);
            writer.encrypt_chunk(&[0u8; 16]).unwrap();
            let handle = writer.finalize_segment().unwrap();
            assert_eq!(handle.sequence, expected);
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn abort_removes_the_partial_file() {
        let dir = temp_dir("abort");
        let mut writer = SegmentCipherWriter::new(dir.clone(), SessionDataKey::generate());
        writer.open_new_segment().unwrap();
        writer.encrypt_chunk(&[3u8; 64]).unwrap();
        let path = dir.join("segment_00000.aseg");
        assert!(path.exists());

        writer.abort_segment();
        assert!(!path.exists());
        fs::remove_dir_all(&dir).ok();
    }
}
