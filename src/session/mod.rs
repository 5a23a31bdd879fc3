pub mod recorder;
pub(crate) mod worker;

pub use recorder::{DeviceFactory, RecorderDiagnostics, SessionRecorder};
