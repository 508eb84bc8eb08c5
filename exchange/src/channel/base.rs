use std::future::Future;

use crate::error::ExchangeResult;
use crate::types::{OperationMessage, PushAck, TargetId};

/// Asynchronous transport delivering operation messages to downstream targets.
///
/// The coordinator calls [`DownstreamChannel::push`] concurrently for different targets, but
/// never has two pushes outstanding for the same target. An error resolves only the leg it was
/// returned for; retries, if any, belong inside the implementation.
pub trait DownstreamChannel<R>: Send + Sync + 'static {
    /// Delivers `message` to `target_id` and resolves with the target's acknowledgement.
    ///
    /// Failure notices are pushed through this method as well; their acknowledgement is ignored.
    fn push(
        &self,
        target_id: TargetId,
        message: OperationMessage<R>,
    ) -> impl Future<Output = ExchangeResult<PushAck>> + Send;
}
