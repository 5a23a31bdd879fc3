use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit};
use parking_lot::Mutex;
use zeroize::Zeroizing;

use crate::keys::session_key::{SessionDataKey, WrappedKey, DEK_LEN};
use crate::models::error::RecorderError;
use crate::traits::key_store::{MasterKeyHandle, MasterKeyPolicy, SecureKeyStore};

/// In-process [`SecureKeyStore`] backed by an AES-256-GCM master key.
///
/// The master key lives only inside the cipher's key schedule and is never
/// exported, mirroring the contract of a hardware store. User presence is
/// modeled explicitly: when the policy demands authentication, wrap/unwrap
/// fail with `AuthenticationRequired` unless [`authorize`](Self::authorize)
/// was called within the policy's validity window.
///
/// Serves targets without a hardware store and doubles as the injectable
/// test store; production deployments with an OS keychain or TPM provide
/// their own `SecureKeyStore` implementation instead.
pub struct SoftwareKeyStore {
    master: Mutex<Option<MasterEntry>>,
    last_auth: Mutex<Option<Instant>>,
    unavailable: AtomicBool,
}

struct MasterEntry {
    cipher: Aes256Gcm,
    policy: MasterKeyPolicy,
}

impl SoftwareKeyStore {
    pub fn new() -> Self {
        Self {
            master: Mutex::new(None),
            last_auth: Mutex::new(None),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Record a user-presence proof, opening the policy's validity window.
    pub fn authorize(&self) {
        *self.last_auth.lock() = Some(Instant::now());
    }

    /// Simulate the secure store being inaccessible (test hook).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RecorderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RecorderError::KeyStoreUnavailable(
                "software key store marked unavailable".into(),
            ));
        }
        Ok(())
    }

    fn check_auth(&self, policy: &MasterKeyPolicy) -> Result<(), RecorderError> {
        if !policy.require_user_auth {
            return Ok(());
        }
        match *self.last_auth.lock() {
            Some(at) if at.elapsed() <= policy.auth_validity => Ok(()),
            _ => Err(RecorderError::AuthenticationRequired),
        }
    }

    /// Run `op` against the master key after availability, alias, and
    /// authentication checks.
    fn with_master<T>(
        &self,
        handle: &MasterKeyHandle,
        op: impl FnOnce(&Aes256Gcm) -> Result<T, RecorderError>,
    ) -> Result<T, RecorderError> {
        self.check_available()?;
        let guard = self.master.lock();
        let entry = guard.as_ref().ok_or_else(|| {
            RecorderError::KeyStoreUnavailable("master key has not been created".into())
        })?;
        if entry.policy.alias != handle.alias() {
            return Err(RecorderError::KeyStoreUnavailable(format!(
                "unknown master key alias: {}",
                handle.alias()
            )));
        }
        self.check_auth(&entry.policy)?;
        op(&entry.cipher)
    }
}

impl Default for SoftwareKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureKeyStore for SoftwareKeyStore {
    fn get_or_create(&self, policy: &MasterKeyPolicy) -> Result<MasterKeyHandle, RecorderError> {
        self.check_available()?;
        let mut guard = self.master.lock();
        if guard.is_none() {
            let key = Aes256Gcm::generate_key(&mut OsRng);
            *guard = Some(MasterEntry {
                cipher: Aes256Gcm::new(&key),
                policy: policy.clone(),
            });
        }
        // Existing key keeps its creation-time policy and alias.
        let entry = guard.as_ref().ok_or_else(|| {
            RecorderError::KeyStoreUnavailable("master key creation failed".into())
        })?;
        Ok(MasterKeyHandle::new(entry.policy.alias.clone()))
    }

    fn wrap(&self, key: &MasterKeyHandle, dek: &SessionDataKey) -> Result<WrappedKey, RecorderError> {
        self.with_master(key, |cipher| {
            let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
            let sealed = cipher
                .encrypt(&nonce, dek.expose().as_slice())
                .map_err(|_| RecorderError::CryptoFailure("session key wrap failed".into()))?;

            let mut blob = Vec::with_capacity(nonce.len() + sealed.len());
            blob.extend_from_slice(&nonce);
            blob.extend_from_slice(&sealed);
            WrappedKey::from_bytes(blob)
        })
    }

    fn unwrap(&self, key: &MasterKeyHandle, wrapped: &WrappedKey) -> Result<SessionDataKey, RecorderError> {
        self.with_master(key, |cipher| {
            let nonce = GenericArray::from_slice(wrapped.nonce());
            let plain = cipher
                .decrypt(nonce, wrapped.sealed())
                .map_err(|_| RecorderError::integrity())?;
            let mut plain = Zeroizing::new(plain);

            if plain.len() != DEK_LEN {
                return Err(RecorderError::integrity());
            }
            let mut bytes = Zeroizing::new([0u8; DEK_LEN]);
            bytes.copy_from_slice(&plain);
            plain.clear();
            Ok(SessionDataKey::from_bytes(bytes))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn open_policy() -> MasterKeyPolicy {
        MasterKeyPolicy {
            require_user_auth: false,
            ..Default::default()
        }
    }

    #[test]
    fn wrap_unwrap_round_trip() {
        let store = SoftwareKeyStore::new();
        let handle = store.get_or_create(&open_policy()).unwrap();

        let dek = SessionDataKey::generate();
        let wrapped = store.wrap(&handle, &dek).unwrap();
        let recovered = store.unwrap(&handle, &wrapped).unwrap();
        assert_eq!(dek.expose(), recovered.expose());
    }

    #[test]
    fn unwrap_with_wrong_master_key_is_integrity_failure() {
        let store_a = SoftwareKeyStore::new();
        let store_b = SoftwareKeyStore::new();
        let handle_a = store_a.get_or_create(&open_policy()).unwrap();
        let handle_b = store_b.get_or_create(&open_policy()).unwrap();

        let dek = SessionDataKey::generate();
        let wrapped = store_a.wrap(&handle_a, &dek).unwrap();

        let err = store_b.unwrap(&handle_b, &wrapped).unwrap_err();
        assert_eq!(err, RecorderError::integrity());
    }

    #[test]
    fn auth_gating_blocks_until_authorized() {
        let store = SoftwareKeyStore::new();
        let policy = MasterKeyPolicy {
            require_user_auth: true,
            auth_validity: Duration::from_secs(60),
            ..Default::default()
        };
        let handle = store.get_or_create(&policy).unwrap();
        let dek = SessionDataKey::generate();

        assert_eq!(
            store.wrap(&handle, &dek).unwrap_err(),
            RecorderError::AuthenticationRequired
        );

        store.authorize();
        assert!(store.wrap(&handle, &dek).is_ok());
    }

    #[test]
    fn expired_authorization_requires_a_fresh_proof() {
        let store = SoftwareKeyStore::new();
        let policy = MasterKeyPolicy {
            require_user_auth: true,
            auth_validity: Duration::ZERO,
            ..Default::default()
        };
        let handle = store.get_or_create(&policy).unwrap();
        store.authorize();
        std::thread::sleep(Duration::from_millis(5));

        let dek = SessionDataKey::generate();
        assert_eq!(
            store.wrap(&handle, &dek).unwrap_err(),
            RecorderError::AuthenticationRequired
        );
    }

    #[test]
    fn unavailable_store_reports_key_store_unavailable() {
        let store = SoftwareKeyStore::new();
        store.set_unavailable(true);
        let err = store.get_or_create(&open_policy()).unwrap_err();
        assert!(matches!(err, RecorderError::KeyStoreUnavailable(_)));
    }

    #[test]
    fn tampered_blob_fails_to_unwrap() {
        let store = SoftwareKeyStore::new();
        let handle = store.get_or_create(&open_policy()).unwrap();
        let dek = SessionDataKey::generate();

        let wrapped = store.wrap(&handle, &dek).unwrap();
        let mut bytes = wrapped.as_bytes().to_vec();
        bytes[20] ^= 0x01;
        let tampered = WrappedKey::from_bytes(bytes).unwrap();

        assert_eq!(store.unwrap(&handle, &tampered).unwrap_err(), RecorderError::integrity());
    }
}
