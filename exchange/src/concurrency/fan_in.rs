use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts outstanding asynchronous responses down to zero.
///
/// Exactly one call to [`FanInCounter::arrive`] observes the transition to zero, which makes
/// that caller the single owner of the follow-up action.
#[derive(Debug)]
pub struct FanInCounter {
    remaining: AtomicUsize,
}

impl FanInCounter {
    /// Creates a counter expecting `expected` responses.
    pub fn new(expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
        }
    }

    /// Records one response.
    ///
    /// Returns `true` only for the response that brought the counter to zero. Arrivals after
    /// zero are ignored and return `false`.
    pub fn arrive(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok_and(|previous| previous == 1)
    }

    /// Returns the number of responses still outstanding.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}
