pub mod hierarchy;
pub mod session_key;
pub mod software_store;

pub use hierarchy::KeyHierarchy;
pub use session_key::{SessionDataKey, WrappedKey, DEK_LEN, WRAPPED_KEY_LEN};
pub use software_store::SoftwareKeyStore;
