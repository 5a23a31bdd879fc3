pub mod erase;
pub mod manifest;
pub mod reconstruct;
pub mod segment_writer;
pub mod stream_cipher;

pub use erase::{erase_all, remove_session_dir, secure_erase};
pub use manifest::{read_manifest, write_manifest};
pub use reconstruct::Reconstructor;
pub use segment_writer::SegmentCipherWriter;
pub use stream_cipher::{SegmentStreamCipher, GCM_NONCE_LEN, GCM_TAG_LEN};
