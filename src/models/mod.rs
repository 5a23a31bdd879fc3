pub mod artifacts;
pub mod config;
pub mod error;
pub mod state;
