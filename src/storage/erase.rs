use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::Path;

use crate::models::artifacts::SegmentHandle;
use crate::models::error::RecorderError;

const OVERWRITE_BLOCK: usize = 64 * 1024;

/// Overwrite a file's full length with zeros, sync, then delete it.
///
/// Best-effort: journaling filesystems and wear-leveled flash may retain
/// remnants, which is a documented residual risk rather than a correctness
/// bug. An already-missing file is not an error.
pub fn secure_erase(path: &Path) -> Result<(), RecorderError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(storage_err("stat file for erase", e)),
    };

    let mut file = match OpenOptions::new().write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(storage_err("open file for erase", e)),
    };

    file.seek(SeekFrom::Start(0)).map_err(|e| storage_err("seek", e))?;
    let zeros = [0u8; OVERWRITE_BLOCK];
    let mut remaining = metadata.len();
    while remaining > 0 {
        let n = remaining.min(OVERWRITE_BLOCK as u64) as usize;
        file.write_all(&zeros[..n]).map_err(|e| storage_err("overwrite", e))?;
        remaining -= n as u64;
    }
    file.flush().map_err(|e| storage_err("flush", e))?;
    file.sync_all().map_err(|e| storage_err("sync", e))?;
    drop(file);

    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(storage_err("remove file", e)),
    }
}

/// Erase every segment in the list, logging failures instead of raising.
/// Used on the cancellation path, which must never fail.
pub fn erase_all(segments: &[SegmentHandle]) {
    for segment in segments {
        if let Err(e) = secure_erase(&segment.path) {
            log::warn!("failed to erase segment {}: {e}", segment.sequence);
        }
    }
}

/// Remove a now-empty session directory. Leftovers were either erased
/// already or never contained plaintext; failures are logged only.
pub fn remove_session_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("failed to remove session directory {}: {e}", dir.display());
        }
    }
}

fn storage_err(action: &str, e: std::io::Error) -> RecorderError {
    RecorderError::StorageError(format!("{action} failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("secure_capture_erase_{}_{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn erases_existing_file() {
        let path = temp_path("existing");
        fs::write(&path, vec![0xABu8; 200_000]).unwrap();

        secure_erase(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = temp_path("missing");
        assert!(secure_erase(&path).is_ok());
    }

    #[test]
    fn erase_all_tolerates_partial_failure() {
        let present = temp_path("present");
        fs::write(&present, b"data").unwrap();
        let segments = vec![
            SegmentHandle {
                sequence: 0,
                path: temp_path("gone"),
                ciphertext_len: 0,
            },
            SegmentHandle {
                sequence: 1,
                path: present.clone(),
                ciphertext_len: 4,
            },
        ];

        erase_all(&segments);
        assert!(!present.exists());
    }
}
