use std::sync::Arc;

use crate::concurrency::completion::Completion;
use crate::coordinator::operation::{DistributionOperation, OperationStatsSnapshot};
use crate::coordinator::target::TargetState;
use crate::error::ExchangeResult;
use crate::types::{OperationId, TargetId};

/// Handle to a started distribution operation.
///
/// The operation runs in the background regardless of whether the handle is kept; dropping the
/// handle only gives up the ability to observe the outcome or to cancel.
#[derive(Debug)]
pub struct DistributionHandle {
    operation: Arc<DistributionOperation>,
    completion: Completion,
}

impl DistributionHandle {
    pub(crate) fn new(operation: Arc<DistributionOperation>, completion: Completion) -> Self {
        Self {
            operation,
            completion,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation.operation_id()
    }

    /// Returns the shared operation state, e.g. to cancel from another task.
    pub fn operation(&self) -> &Arc<DistributionOperation> {
        &self.operation
    }

    /// Requests cancellation. See [`DistributionOperation::cancel`].
    pub fn cancel(&self) {
        self.operation.cancel();
    }

    pub fn stats(&self) -> OperationStatsSnapshot {
        self.operation.stats()
    }

    pub fn target_states(&self) -> Vec<(TargetId, TargetState)> {
        self.operation.target_states()
    }

    pub fn is_finished(&self) -> bool {
        self.operation.is_finished()
    }

    /// Waits for the operation to finish.
    ///
    /// Resolves with `Ok(())` when every target was served, or with the first failure recorded
    /// by the operation.
    pub async fn wait(self) -> ExchangeResult<()> {
        self.completion.await
    }

    /// Splits the handle into the shared operation state and its completion future.
    pub fn into_parts(self) -> (Arc<DistributionOperation>, Completion) {
        (self.operation, self.completion)
    }
}
