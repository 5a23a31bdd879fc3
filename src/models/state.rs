/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → recording ↔ paused
///            ↓         ↓
///         stopping → idle
///
/// failed reachable from recording/paused on device or cipher error;
/// stop()/cancel() lead back to idle from failed.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopping,
    Failed,
}

impl RecorderState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// A session exists and has not yet been torn down.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(RecorderState::Idle.is_idle());
        assert!(RecorderState::Recording.is_active());
        assert!(RecorderState::Paused.is_active());
        assert!(RecorderState::Failed.is_active());
        assert!(!RecorderState::Stopping.is_active());
        assert!(!RecorderState::Idle.is_active());
    }
}
