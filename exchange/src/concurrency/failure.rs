use std::sync::OnceLock;

use crate::error::ExchangeError;

/// Write-once cell holding the first failure of an operation.
#[derive(Debug, Default)]
pub struct FailureCell {
    failure: OnceLock<ExchangeError>,
}

impl FailureCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `failure` if no failure was recorded before.
    ///
    /// Returns `true` when this call won the race and its failure became the operation failure.
    pub fn record(&self, failure: ExchangeError) -> bool {
        self.failure.set(failure).is_ok()
    }

    /// Returns the recorded failure, if any.
    pub fn get(&self) -> Option<&ExchangeError> {
        self.failure.get()
    }

    pub fn is_set(&self) -> bool {
        self.failure.get().is_some()
    }
}
