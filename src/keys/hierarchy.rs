use std::sync::Arc;

use parking_lot::Mutex;

use crate::keys::session_key::{SessionDataKey, WrappedKey};
use crate::models::error::RecorderError;
use crate::traits::key_store::{MasterKeyHandle, MasterKeyPolicy, SecureKeyStore};

/// Two-tier key hierarchy: a hardware-protected master key (KEK) wrapping
/// ephemeral per-session data keys (DEKs).
///
/// The master key never leaves the injected [`SecureKeyStore`]; this type
/// only ever holds an opaque handle, resolved lazily on first use and
/// cached for the store's lifetime.
pub struct KeyHierarchy {
    store: Arc<dyn SecureKeyStore>,
    policy: MasterKeyPolicy,
    master: Mutex<Option<MasterKeyHandle>>,
}

impl KeyHierarchy {
    pub fn new(store: Arc<dyn SecureKeyStore>, policy: MasterKeyPolicy) -> Self {
        Self {
            store,
            policy,
            master: Mutex::new(None),
        }
    }

    /// Handle to the master key, created in the store on first use.
    pub fn master_key(&self) -> Result<MasterKeyHandle, RecorderError> {
        let mut cached = self.master.lock();
        if let Some(handle) = cached.as_ref() {
            return Ok(handle.clone());
        }
        let handle = self.store.get_or_create(&self.policy)?;
        *cached = Some(handle.clone());
        Ok(handle)
    }

    /// Fresh cryptographically random session key, held in memory only.
    pub fn generate_session_key(&self) -> SessionDataKey {
        SessionDataKey::generate()
    }

    pub fn wrap_session_key(&self, dek: &SessionDataKey) -> Result<WrappedKey, RecorderError> {
        let master = self.master_key()?;
        self.store.wrap(&master, dek)
    }

    pub fn unwrap_session_key(&self, wrapped: &WrappedKey) -> Result<SessionDataKey, RecorderError> {
        let master = self.master_key()?;
        self.store.unwrap(&master, wrapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::software_store::SoftwareKeyStore;

    fn hierarchy() -> KeyHierarchy {
        let policy = MasterKeyPolicy {
            require_user_auth: false,
            ..Default::default()
        };
        KeyHierarchy::new(Arc::new(SoftwareKeyStore::new()), policy)
    }

    #[test]
    fn wrap_then_unwrap_recovers_the_session_key() {
        let keys = hierarchy();
        let dek = keys.generate_session_key();
        let wrapped = keys.wrap_session_key(&dek).unwrap();
        let recovered = keys.unwrap_session_key(&wrapped).unwrap();
        assert_eq!(dek.expose(), recovered.expose());
    }

    #[test]
    fn master_key_handle_is_stable_across_uses() {
        let keys = hierarchy();
        let first = keys.master_key().unwrap();
        let second = keys.master_key().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn authentication_failure_propagates_from_the_store() {
        let store = Arc::new(SoftwareKeyStore::new());
        let policy = MasterKeyPolicy {
            require_user_auth: true,
            ..Default::default()
        };
        let keys = KeyHierarchy::new(store, policy);
        let dek = keys.generate_session_key();
        assert_eq!(
            keys.wrap_session_key(&dek).unwrap_err(),
            RecorderError::AuthenticationRequired
        );
    }
}
