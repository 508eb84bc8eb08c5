use crate::error::ExchangeError;
use crate::types::{Bucket, OperationId, SequenceIndex};

/// Message pushed to one downstream target.
///
/// A data message carries a bucket and no failure. A failure notice carries the operation's
/// recorded failure, no bucket, and is always the last message a target receives.
#[derive(Debug, Clone)]
pub struct OperationMessage<R> {
    pub operation_id: OperationId,
    pub sequence_index: SequenceIndex,
    pub bucket: Option<Bucket<R>>,
    pub is_last: bool,
    pub failure: Option<ExchangeError>,
}

impl<R> OperationMessage<R> {
    /// Creates a data message for one flush cycle.
    pub fn data(
        operation_id: OperationId,
        sequence_index: SequenceIndex,
        bucket: Bucket<R>,
        is_last: bool,
    ) -> Self {
        Self {
            operation_id,
            sequence_index,
            bucket: Some(bucket),
            is_last,
            failure: None,
        }
    }

    /// Creates a failure notice without data payload.
    pub fn failure(
        operation_id: OperationId,
        sequence_index: SequenceIndex,
        failure: ExchangeError,
    ) -> Self {
        Self {
            operation_id,
            sequence_index,
            bucket: None,
            is_last: true,
            failure: Some(failure),
        }
    }

    /// Returns `true` if this message notifies the target of an operation failure.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Acknowledgement returned by a downstream target for one pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushAck {
    /// Whether the target accepts further data from this operation.
    pub wants_more: bool,
}

impl PushAck {
    /// Acknowledgement requesting more data.
    pub const MORE: PushAck = PushAck { wants_more: true };

    /// Acknowledgement withdrawing from the operation.
    pub const DONE: PushAck = PushAck { wants_more: false };
}
