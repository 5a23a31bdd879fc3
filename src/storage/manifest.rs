use std::fs;
use std::path::{Path, PathBuf};

use crate::models::artifacts::SessionArtifacts;
use crate::models::error::RecorderError;

/// Write the session artifacts as a JSON manifest sidecar.
///
/// Creates `manifest.json` inside `dir`. Contains only values that are safe
/// to persist: segment references, the wrapped (never plaintext) session
/// key, and timing metadata.
pub fn write_manifest(artifacts: &SessionArtifacts, dir: &Path) -> Result<PathBuf, RecorderError> {
    let path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(artifacts)
        .map_err(|e| RecorderError::StorageError(format!("failed to serialize manifest: {e}")))?;
    fs::write(&path, json)
        .map_err(|e| RecorderError::StorageError(format!("failed to write manifest: {e}")))?;
    Ok(path)
}

/// Read session artifacts back from a manifest sidecar.
pub fn read_manifest(path: &Path) -> Result<SessionArtifacts, RecorderError> {
    let json = fs::read_to_string(path)
        .map_err(|e| RecorderError::StorageError(format!("failed to read manifest: {e}")))?;
    serde_json::from_str(&json)
        .map_err(|e| RecorderError::StorageError(format!("failed to parse manifest: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{WrappedKey, WRAPPED_KEY_LEN};
    use crate::models::artifacts::SegmentHandle;

    #[test]
    fn manifest_round_trip() {
        let dir = std::env::temp_dir().join(format!("secure_capture_manifest_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let artifacts = SessionArtifacts::new(
            vec![SegmentHandle {
                sequence: 0,
                path: dir.join("segment_00000.aseg"),
                ciphertext_len: 3200,
            }],
            WrappedKey::from_bytes(vec![7u8; WRAPPED_KEY_LEN]).unwrap(),
            12.5,
        );

        let path = write_manifest(&artifacts, &dir).unwrap();
        let loaded = read_manifest(&path).unwrap();

        assert_eq!(loaded.id, artifacts.id);
        assert_eq!(loaded.segments, artifacts.segments);
        assert_eq!(loaded.wrapped_key, artifacts.wrapped_key);
        assert_eq!(loaded.duration_secs, artifacts.duration_secs);

        fs::remove_dir_all(&dir).ok();
    }
}
