//! # secure-capture-core
//!
//! Real-time segmented encryption recording core.
//!
//! Captures microphone audio under the guarantee that unencrypted audio is
//! never held in memory or on disk longer than the instant it is produced
//! and consumed: frames are encrypted as they arrive into rotating
//! authenticated-encryption segments, keyed by an ephemeral session key
//! that only ever leaves the process wrapped under a hardware-backed
//! master key.
//!
//! ## Architecture
//!
//! ```text
//! secure-capture-core (this crate)
//! ├── traits/   ← CaptureDevice, SecureKeyStore, AmplitudeObserver
//! ├── models/   ← RecorderError, RecorderState, RecorderConfig, artifacts
//! ├── keys/     ← KeyHierarchy, SessionDataKey, WrappedKey, SoftwareKeyStore
//! ├── storage/  ← SegmentStreamCipher, SegmentCipherWriter, Reconstructor,
//! │               secure erase, artifact manifest
//! └── session/  ← SessionRecorder (orchestrator) + capture worker thread
//! ```
//!
//! Data flow: capture loop → segment cipher writer → segment files
//! (ciphertext only) → `stop()` hands the ordered segment list plus the
//! wrapped key to the caller → `Reconstructor` later stitches a verified
//! plaintext stream for upload → secure erase wipes the segments.

pub mod keys;
pub mod models;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use keys::{KeyHierarchy, SessionDataKey, SoftwareKeyStore, WrappedKey};
pub use models::artifacts::{SegmentHandle, SessionArtifacts};
pub use models::config::RecorderConfig;
pub use models::error::RecorderError;
pub use models::state::RecorderState;
pub use session::{DeviceFactory, RecorderDiagnostics, SessionRecorder};
pub use storage::{Reconstructor, SegmentCipherWriter};
pub use traits::amplitude::{AmplitudeObserver, AmplitudeSample};
pub use traits::capture_device::CaptureDevice;
pub use traits::key_store::{MasterKeyHandle, MasterKeyPolicy, SecureKeyStore};
