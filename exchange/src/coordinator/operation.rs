use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use metrics::counter;
use tracing::{info, warn};

use crate::concurrency::cancel::CancelTx;
use crate::concurrency::completion::CompletionSignal;
use crate::concurrency::failure::FailureCell;
use crate::coordinator::target::{DownstreamTarget, TargetState};
use crate::error::{ErrorKind, ExchangeError, ExchangeResult};
use crate::exchange_error;
use crate::metrics::{
    ERROR_KIND_LABEL, EXCHANGE_FAILURE_NOTICES_TOTAL, EXCHANGE_FLUSH_CYCLES_TOTAL,
    EXCHANGE_PUSH_FAILURES_TOTAL, EXCHANGE_PUSHES_TOTAL, EXCHANGE_ROWS_PULLED_TOTAL,
};
use crate::types::{OperationId, SequenceIndex, TargetId};

/// Counters describing the progress of one operation.
///
/// Every counter is mirrored to the matching `metrics` counter when recorded.
#[derive(Debug, Default)]
pub(crate) struct OperationStats {
    flush_cycles: AtomicU64,
    rows_pulled: AtomicU64,
    pushes_sent: AtomicU64,
    push_failures: AtomicU64,
    failure_notices: AtomicU64,
}

impl OperationStats {
    pub(crate) fn record_flush_cycle(&self) {
        self.flush_cycles.fetch_add(1, Ordering::Relaxed);
        counter!(EXCHANGE_FLUSH_CYCLES_TOTAL).increment(1);
    }

    pub(crate) fn record_row_pulled(&self) {
        self.rows_pulled.fetch_add(1, Ordering::Relaxed);
        counter!(EXCHANGE_ROWS_PULLED_TOTAL).increment(1);
    }

    pub(crate) fn record_push(&self) {
        self.pushes_sent.fetch_add(1, Ordering::Relaxed);
        counter!(EXCHANGE_PUSHES_TOTAL).increment(1);
    }

    pub(crate) fn record_push_failure(&self, kind: ErrorKind) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
        counter!(EXCHANGE_PUSH_FAILURES_TOTAL, ERROR_KIND_LABEL => kind.as_label()).increment(1);
    }

    pub(crate) fn record_failure_notice(&self) {
        self.failure_notices.fetch_add(1, Ordering::Relaxed);
        counter!(EXCHANGE_FAILURE_NOTICES_TOTAL).increment(1);
    }

    fn snapshot(&self) -> OperationStatsSnapshot {
        OperationStatsSnapshot {
            flush_cycles: self.flush_cycles.load(Ordering::Relaxed),
            rows_pulled: self.rows_pulled.load(Ordering::Relaxed),
            pushes_sent: self.pushes_sent.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            failure_notices: self.failure_notices.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of an operation's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStatsSnapshot {
    /// Data cycles flushed, including the last one.
    pub flush_cycles: u64,
    /// Rows pulled from the upstream source.
    pub rows_pulled: u64,
    /// Pushes started, data and failure notices alike.
    pub pushes_sent: u64,
    /// Pushes that resolved with an error.
    pub push_failures: u64,
    /// Failure notices sent.
    pub failure_notices: u64,
}

/// State of one distribution operation shared by the pulling task, every push callback and
/// the caller's handle.
#[derive(Debug)]
pub struct DistributionOperation {
    operation_id: OperationId,
    targets: Vec<DownstreamTarget>,
    sequence_index: AtomicU64,
    is_last: AtomicBool,
    failure: FailureCell,
    completion: CompletionSignal,
    /// Serializes caller cancellation against resolving the completion.
    settle: Mutex<()>,
    cancel_tx: CancelTx,
    pub(crate) stats: OperationStats,
}

impl DistributionOperation {
    pub(crate) fn new(
        operation_id: OperationId,
        target_count: u32,
        completion: CompletionSignal,
        cancel_tx: CancelTx,
    ) -> Self {
        Self {
            operation_id,
            targets: (0..target_count)
                .map(|id| DownstreamTarget::new(TargetId(id)))
                .collect(),
            sequence_index: AtomicU64::new(0),
            is_last: AtomicBool::new(false),
            failure: FailureCell::new(),
            completion,
            settle: Mutex::new(()),
            cancel_tx,
            stats: OperationStats::default(),
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn targets(&self) -> &[DownstreamTarget] {
        &self.targets
    }

    /// Returns the state of every target, ordered by target id.
    pub fn target_states(&self) -> Vec<(TargetId, TargetState)> {
        self.targets
            .iter()
            .map(|target| (target.id(), target.state()))
            .collect()
    }

    /// Returns `true` while at least one target still needs data.
    pub fn any_target_wants_more(&self) -> bool {
        self.targets.iter().any(DownstreamTarget::needs_more_data)
    }

    /// Sequence index of the most recent cycle, `0` before the first one.
    pub fn sequence_index(&self) -> SequenceIndex {
        self.sequence_index.load(Ordering::Acquire)
    }

    pub(crate) fn next_sequence_index(&self) -> SequenceIndex {
        self.sequence_index.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns `true` once the upstream source has been exhausted.
    pub fn is_last(&self) -> bool {
        self.is_last.load(Ordering::Acquire)
    }

    pub(crate) fn mark_last(&self) {
        self.is_last.store(true, Ordering::Release);
    }

    /// Returns the failure recorded for this operation, if any.
    pub fn failure(&self) -> Option<&ExchangeError> {
        self.failure.get()
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failure.is_set()
    }

    /// Records `failure` unless another failure was recorded first.
    ///
    /// Returns `true` if `failure` became the operation failure.
    pub(crate) fn record_failure(&self, failure: ExchangeError) -> bool {
        let kind = failure.kind();
        let detail = failure.to_string();
        if self.failure.record(failure) {
            info!(operation_id = %self.operation_id, error = %detail, "recorded operation failure");
            true
        } else {
            warn!(
                operation_id = %self.operation_id,
                error_kind = ?kind,
                "ignoring failure observed after the operation already failed"
            );
            false
        }
    }

    /// Resolves the completion with the recorded outcome.
    ///
    /// Returns the outcome if this call resolved the completion, [`None`] if it was already
    /// resolved. A cancellation either lands before the outcome is read or is ignored.
    pub(crate) fn resolve_outcome(&self) -> Option<ExchangeResult<()>> {
        let _settle = self.settle.lock().unwrap_or_else(PoisonError::into_inner);

        let result = match self.failure() {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        };
        self.completion.resolve(result.clone()).then_some(result)
    }

    /// Returns `true` once the completion has been resolved.
    pub fn is_finished(&self) -> bool {
        self.completion.is_resolved()
    }

    /// Requests cancellation of the operation.
    ///
    /// The cancellation becomes the operation failure unless another failure was recorded or
    /// the operation already finished. Pushes in flight are allowed to complete; the targets
    /// still waiting afterwards receive a failure notice.
    pub fn cancel(&self) {
        {
            let _settle = self.settle.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_finished() {
                return;
            }

            self.record_failure(exchange_error!(
                ErrorKind::OperationCanceled,
                "Distribution operation canceled",
                format!("operation {} was canceled by the caller", self.operation_id)
            ));
        }
        self.cancel_tx.cancel();
    }

    /// Returns a snapshot of the progress counters.
    pub fn stats(&self) -> OperationStatsSnapshot {
        self.stats.snapshot()
    }
}
