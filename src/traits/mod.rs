pub mod amplitude;
pub mod capture_device;
pub mod key_store;
