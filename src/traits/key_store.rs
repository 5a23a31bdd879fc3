use std::time::Duration;

use crate::keys::{SessionDataKey, WrappedKey};
use crate::models::error::RecorderError;

/// Policy attributes for the hardware-backed master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyPolicy {
    /// Persistent keystore alias under which the master key lives.
    pub alias: String,

    /// Require a recent user-presence proof before each use.
    pub require_user_auth: bool,

    /// How long one user-presence proof remains valid.
    pub auth_validity: Duration,
}

impl Default for MasterKeyPolicy {
    fn default() -> Self {
        Self {
            alias: "secure-capture-master".into(),
            require_user_auth: true,
            // One working day: re-authentication at most once per shift.
            auth_validity: Duration::from_secs(8 * 60 * 60),
        }
    }
}

/// Opaque reference to a master key held inside a secure key store.
///
/// Carries no key material; all cryptographic use goes back through the
/// store that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyHandle {
    alias: String,
}

impl MasterKeyHandle {
    pub fn new(alias: impl Into<String>) -> Self {
        Self { alias: alias.into() }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Capability interface for a hardware-backed secure key store.
///
/// Implementations hold the master key (KEK) internally and never expose
/// its raw bytes; callers only ever see `MasterKeyHandle`s and wrapped
/// blobs. Per-platform backends (OS keychain, TPM) implement this, as does
/// the in-process [`SoftwareKeyStore`](crate::keys::SoftwareKeyStore).
pub trait SecureKeyStore: Send + Sync {
    /// Return a handle to the master key, generating it on first use with
    /// the given policy.
    ///
    /// Errors: `AuthenticationRequired` if the key needs a user-presence
    /// proof the caller cannot currently satisfy; `KeyStoreUnavailable` if
    /// the secure store cannot be opened.
    fn get_or_create(&self, policy: &MasterKeyPolicy) -> Result<MasterKeyHandle, RecorderError>;

    /// Authenticated-encrypt the session key under the master key with a
    /// fresh random nonce.
    fn wrap(&self, key: &MasterKeyHandle, dek: &SessionDataKey) -> Result<WrappedKey, RecorderError>;

    /// Inverse of `wrap`. Errors with `IntegrityFailure` if the blob's
    /// authentication tag does not verify (tamper, corruption, wrong key).
    fn unwrap(&self, key: &MasterKeyHandle, wrapped: &WrappedKey) -> Result<SessionDataKey, RecorderError>;
}
