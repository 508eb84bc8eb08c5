use std::sync::atomic::{AtomicBool, Ordering};

/// Guard ensuring a release action runs exactly once across concurrent callers.
#[derive(Debug, Default)]
pub struct CloseOnce {
    closed: AtomicBool,
}

impl CloseOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the guarded resource closed.
    ///
    /// Returns `true` for the single caller that must perform the close.
    pub fn try_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
