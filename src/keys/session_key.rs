use std::fmt;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::models::error::RecorderError;
use crate::storage::stream_cipher::{GCM_NONCE_LEN, GCM_TAG_LEN};

/// Session data key length in bytes (AES-256).
pub const DEK_LEN: usize = 32;

/// Wrapped key blob length: `nonce || ciphertext(DEK) || tag`.
pub const WRAPPED_KEY_LEN: usize = GCM_NONCE_LEN + DEK_LEN + GCM_TAG_LEN;

/// Ephemeral per-session data-encryption key (DEK).
///
/// Exists in process memory only, is never serialized, and is zeroed on
/// drop. Deliberately not `Clone`: the key moves between components by
/// ownership or reference, never into a third copy.
pub struct SessionDataKey(Zeroizing<[u8; DEK_LEN]>);

impl SessionDataKey {
    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; DEK_LEN]);
        OsRng.fill_bytes(&mut *bytes);
        Self(bytes)
    }

    /// Rebuild a key from raw bytes, taking ownership of them. The caller's
    /// copy should already live in zeroizing storage.
    pub fn from_bytes(bytes: Zeroizing<[u8; DEK_LEN]>) -> Self {
        Self(bytes)
    }

    /// Raw key bytes. Use sparingly: only to key a cipher, never to copy
    /// the key elsewhere.
    pub fn expose(&self) -> &[u8; DEK_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionDataKey(<redacted>)")
    }
}

/// A DEK encrypted under the master key: `nonce(12) || ciphertext(32) || tag(16)`.
///
/// Opaque and safe to persist or transmit; serializes as base64.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RecorderError> {
        if bytes.len() != WRAPPED_KEY_LEN {
            return Err(RecorderError::CryptoFailure(format!(
                "wrapped key must be {WRAPPED_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The wrap nonce (first 12 bytes).
    pub fn nonce(&self) -> &[u8] {
        &self.0[..GCM_NONCE_LEN]
    }

    /// Ciphertext plus trailing tag (everything after the nonce).
    pub fn sealed(&self) -> &[u8] {
        &self.0[GCM_NONCE_LEN..]
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, RecorderError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| RecorderError::CryptoFailure(format!("invalid base64 wrapped key: {e}")))?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

impl Serialize for WrappedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = SessionDataKey::generate();
        let b = SessionDataKey::generate();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn wrapped_key_base64_round_trip() {
        let blob: Vec<u8> = (0..WRAPPED_KEY_LEN as u8).collect();
        let key = WrappedKey::from_bytes(blob.clone()).unwrap();
        let decoded = WrappedKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(decoded.as_bytes(), &blob[..]);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(WrappedKey::from_bytes(vec![0u8; 10]).is_err());
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = SessionDataKey::generate();
        assert_eq!(format!("{key:?}"), "SessionDataKey(<redacted>)");
    }
}
