use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use exchange_config::shared::DistributionConfig;
use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::{counter, gauge};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::channel::DownstreamChannel;
use crate::concurrency::cancel::{CancelRx, canceled, create_cancel_channel};
use crate::concurrency::close::CloseOnce;
use crate::concurrency::completion::create_completion;
use crate::concurrency::fan_in::FanInCounter;
use crate::concurrency::trampoline::{Bounce, Trampoline};
use crate::coordinator::handle::DistributionHandle;
use crate::coordinator::operation::DistributionOperation;
use crate::coordinator::target::TargetState;
use crate::error::{ErrorKind, ExchangeError, ExchangeResult};
use crate::exchange_error;
use crate::failpoints::{COORDINATOR_BEFORE_BUILD, COORDINATOR_BEFORE_LOAD, exchange_fail_point};
use crate::metrics::{EXCHANGE_ACTIVE_OPERATIONS, EXCHANGE_OPERATIONS_FINISHED_TOTAL, OUTCOME_LABEL};
use crate::partitioner::BucketPartitioner;
use crate::types::{Bucket, OperationId, OperationMessage, PushAck, SequenceIndex, TargetId};
use crate::upstream::UpstreamSource;

/// Distributes the rows of one upstream source to a fixed set of downstream targets.
///
/// Rows are pulled into the partitioner until either the configured page size or the byte
/// budget is reached, or the upstream is exhausted. Each flush cycle then pushes one bucket to
/// every target that still wants data, concurrently, and the next pull only starts once every
/// push of the cycle has been acknowledged or has failed. A target acknowledging with
/// `wants_more = false` is never pushed to again.
///
/// The first error observed anywhere, upstream or downstream, fails the whole operation: the
/// upstream is closed, every target still waiting receives one failure notice, and the
/// completion resolves with that error.
pub struct DistributionCoordinator<U, P, C> {
    operation_id: OperationId,
    config: DistributionConfig,
    target_count: u32,
    upstream: U,
    partitioner: P,
    channel: C,
}

impl<U, P, C> DistributionCoordinator<U, P, C>
where
    U: UpstreamSource,
    P: BucketPartitioner<Row = U::Row>,
    C: DownstreamChannel<U::Row>,
{
    /// Creates a coordinator for `target_count` targets identified `0..target_count`.
    pub fn new(
        operation_id: OperationId,
        config: DistributionConfig,
        target_count: u32,
        upstream: U,
        partitioner: P,
        channel: C,
    ) -> Self {
        Self {
            operation_id,
            config,
            target_count,
            upstream,
            partitioner,
            channel,
        }
    }

    /// Starts distributing in the background and returns immediately.
    ///
    /// Must be called from within a Tokio runtime. The outcome is observed through the returned
    /// [`DistributionHandle`].
    pub fn start(self) -> ExchangeResult<DistributionHandle> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|err| {
            exchange_error!(
                ErrorKind::InvalidState,
                "Distribution must be started within a Tokio runtime",
                source: err
            )
        })?;

        let (completion_signal, completion) = create_completion();
        let (cancel_tx, cancel_rx) = create_cancel_channel();
        let operation = Arc::new(DistributionOperation::new(
            self.operation_id,
            self.target_count,
            completion_signal,
            cancel_tx,
        ));

        let inner = Arc::new(Inner {
            operation: operation.clone(),
            config: self.config,
            pull: Mutex::new(PullState {
                upstream: self.upstream,
                partitioner: self.partitioner,
                cancel_rx,
            }),
            channel: self.channel,
            upstream_closed: CloseOnce::new(),
            runtime: runtime.clone(),
        });

        info!(
            operation_id = %self.operation_id,
            targets = self.target_count,
            page_size = inner.config.page_size,
            max_bucket_bytes = inner.config.max_bucket_bytes,
            "starting distribution operation"
        );
        gauge!(EXCHANGE_ACTIVE_OPERATIONS).increment(1.0);

        let first = if operation.targets().is_empty() {
            Continuation::Finish
        } else {
            Continuation::Pull
        };
        runtime.spawn(inner.continue_with(first));

        Ok(DistributionHandle::new(operation, completion))
    }
}

/// State touched only by the single active pull, never by push callbacks.
struct PullState<U, P> {
    upstream: U,
    partitioner: P,
    cancel_rx: CancelRx,
}

struct Inner<U, P, C> {
    operation: Arc<DistributionOperation>,
    config: DistributionConfig,
    pull: Mutex<PullState<U, P>>,
    channel: C,
    upstream_closed: CloseOnce,
    runtime: Handle,
}

/// Follow-up action owned by whoever settled the previous step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    Pull,
    PropagateFailure,
    Finish,
}

enum PullOutcome<R> {
    Flush { buckets: Vec<Bucket<R>>, is_last: bool },
    Failed(ExchangeError),
    /// The operation failed elsewhere, e.g. it was canceled, while pulling.
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum CycleKind {
    Data { is_last: bool },
    FailureNotice,
}

#[derive(Debug)]
struct Cycle {
    sequence_index: SequenceIndex,
    kind: CycleKind,
    fan_in: FanInCounter,
}

impl<U, P, C> Inner<U, P, C>
where
    U: UpstreamSource,
    P: BucketPartitioner<Row = U::Row>,
    C: DownstreamChannel<U::Row>,
{
    fn operation_id(&self) -> OperationId {
        self.operation.operation_id()
    }

    /// Runs `continuation` and every continuation settled inline after it.
    ///
    /// Boxed so that push callbacks can resume the operation without the future type of the
    /// pull loop containing itself.
    fn continue_with(self: Arc<Self>, continuation: Continuation) -> BoxFuture<'static, ()> {
        async move {
            let mut trampoline = Trampoline::new(self.config.max_inline_cycles);
            let mut next = Some(continuation);

            while let Some(continuation) = next.take() {
                next = match continuation {
                    Continuation::Pull => self.pull_cycle(&mut trampoline).await,
                    Continuation::PropagateFailure => {
                        self.propagate_failure_cycle(&mut trampoline).await
                    }
                    Continuation::Finish => {
                        self.finish().await;
                        None
                    }
                };
            }
        }
        .boxed()
    }

    /// Pulls one cycle worth of rows and flushes it.
    ///
    /// Returns [`None`] when the cycle's pushes were handed to callbacks, one of which resumes
    /// the operation.
    async fn pull_cycle(self: &Arc<Self>, trampoline: &mut Trampoline) -> Option<Continuation> {
        if !self.operation.any_target_wants_more() {
            return Some(Continuation::Finish);
        }

        // A panicking upstream or partitioner fails the operation instead of abandoning it.
        let outcome = match AssertUnwindSafe(self.pull_until_flush())
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => PullOutcome::Failed(exchange_error!(
                ErrorKind::UpstreamFailed,
                "Upstream source panicked",
                format!("pulling rows for operation {} panicked", self.operation_id())
            )),
        };

        match outcome {
            PullOutcome::Flush { buckets, is_last } => {
                self.flush(buckets, is_last, trampoline).await
            }
            PullOutcome::Failed(err) => Some(self.on_upstream_failure(err)),
            PullOutcome::Stopped => Some(Continuation::PropagateFailure),
        }
    }

    async fn pull_until_flush(&self) -> PullOutcome<U::Row> {
        let mut guard = self.pull.lock().await;
        let state = &mut *guard;

        loop {
            if self.operation.has_failed() {
                return PullOutcome::Stopped;
            }

            let row = match state.upstream.move_next() {
                Ok(row) => row,
                Err(err) => return PullOutcome::Failed(err),
            };

            match row {
                Some(row) => {
                    if let Err(err) = state.partitioner.add(row) {
                        return PullOutcome::Failed(err);
                    }
                    self.operation.stats.record_row_pulled();

                    if state.partitioner.size() >= self.config.page_size
                        || state.partitioner.estimated_bytes() >= self.config.max_bucket_bytes
                    {
                        // A full page ending the source closes the operation without an empty
                        // trailing cycle.
                        let is_last = state.upstream.exhausted();
                        if is_last {
                            self.operation.mark_last();
                        }

                        return self.build_buckets(&mut state.partitioner, is_last);
                    }
                }
                None if state.upstream.exhausted() => {
                    self.operation.mark_last();
                    return self.build_buckets(&mut state.partitioner, true);
                }
                None => {
                    if let Err(err) = exchange_fail_point(COORDINATOR_BEFORE_LOAD) {
                        return PullOutcome::Failed(err);
                    }

                    debug!(operation_id = %self.operation_id(), "upstream suspended, waiting for more rows");
                    tokio::select! {
                        biased;

                        _ = canceled(&mut state.cancel_rx) => return PullOutcome::Stopped,
                        result = state.upstream.load_next_batch() => {
                            if let Err(err) = result {
                                return PullOutcome::Failed(err);
                            }
                        }
                    }
                }
            }
        }
    }

    fn build_buckets(&self, partitioner: &mut P, is_last: bool) -> PullOutcome<U::Row> {
        let target_count = self.operation.targets().len();

        let buckets = match exchange_fail_point(COORDINATOR_BEFORE_BUILD)
            .and_then(|()| partitioner.build(target_count))
        {
            Ok(buckets) => buckets,
            Err(err) => return PullOutcome::Failed(err),
        };
        if buckets.len() != target_count {
            return PullOutcome::Failed(exchange_error!(
                ErrorKind::PartitionFailed,
                "Partitioner built an unexpected number of buckets",
                format!("expected {target_count} buckets, got {}", buckets.len())
            ));
        }

        PullOutcome::Flush { buckets, is_last }
    }

    async fn flush(
        self: &Arc<Self>,
        buckets: Vec<Bucket<U::Row>>,
        is_last: bool,
        trampoline: &mut Trampoline,
    ) -> Option<Continuation> {
        // A failure recorded while this cycle was being pulled, e.g. a cancellation, discards
        // its rows.
        if self.operation.has_failed() {
            debug!(
                operation_id = %self.operation_id(),
                "operation failed while pulling, discarding cycle"
            );
            return Some(Continuation::PropagateFailure);
        }

        let sequence_index = self.operation.next_sequence_index();
        self.operation.stats.record_flush_cycle();

        let mut pushes = Vec::with_capacity(buckets.len());
        for (target, bucket) in self.operation.targets().iter().zip(buckets) {
            debug_assert_eq!(target.id(), bucket.target_id());

            // Targets that withdrew or failed drop their bucket without a network call.
            if !target.begin_push() {
                continue;
            }

            let message =
                OperationMessage::data(self.operation_id(), sequence_index, bucket, is_last);
            pushes.push((target.id(), message));
        }

        debug!(
            operation_id = %self.operation_id(),
            sequence_index,
            is_last,
            targets = pushes.len(),
            "flushing cycle"
        );

        let cycle = Cycle {
            sequence_index,
            kind: CycleKind::Data { is_last },
            fan_in: FanInCounter::new(pushes.len()),
        };
        self.dispatch(cycle, pushes, trampoline).await
    }

    /// Records an upstream or partitioning failure and stops pulling.
    fn on_upstream_failure(&self, err: ExchangeError) -> Continuation {
        error!(
            operation_id = %self.operation_id(),
            error = %err,
            "upstream failed, stopping distribution"
        );
        self.operation.record_failure(err);

        Continuation::PropagateFailure
    }

    /// Notifies every target still waiting of the operation failure.
    async fn propagate_failure_cycle(
        self: &Arc<Self>,
        trampoline: &mut Trampoline,
    ) -> Option<Continuation> {
        // Nothing is pulled once the operation failed.
        self.close_upstream().await;

        let Some(failure) = self.operation.failure().cloned() else {
            warn!(
                operation_id = %self.operation_id(),
                "failure propagation requested without a recorded failure"
            );
            return Some(Continuation::Finish);
        };

        let sequence_index = self.operation.next_sequence_index();
        let pushes = self
            .operation
            .targets()
            .iter()
            .filter(|target| target.begin_push())
            .map(|target| {
                let message =
                    OperationMessage::failure(self.operation_id(), sequence_index, failure.clone());
                (target.id(), message)
            })
            .collect::<Vec<_>>();

        info!(
            operation_id = %self.operation_id(),
            sequence_index,
            targets = pushes.len(),
            error_kind = ?failure.kind(),
            "notifying waiting targets of operation failure"
        );

        let cycle = Cycle {
            sequence_index,
            kind: CycleKind::FailureNotice,
            fan_in: FanInCounter::new(pushes.len()),
        };
        self.dispatch(cycle, pushes, trampoline).await
    }

    /// Sends the pushes of one cycle.
    ///
    /// A lone push is awaited on the current task while the trampoline allows it, so that a
    /// single-target stream does not spawn a task per cycle. Otherwise every push runs as its
    /// own task and the one completing last resumes the operation.
    async fn dispatch(
        self: &Arc<Self>,
        cycle: Cycle,
        mut pushes: Vec<(TargetId, OperationMessage<U::Row>)>,
        trampoline: &mut Trampoline,
    ) -> Option<Continuation> {
        if pushes.is_empty() {
            return Some(self.after_cycle(&cycle));
        }

        if pushes.len() == 1 && trampoline.bounce() == Bounce::Inline {
            let (target_id, message) = pushes.remove(0);
            let result = self.push(target_id, message).await;

            return self.complete_push(target_id, result, &cycle);
        }

        let cycle = Arc::new(cycle);
        for (target_id, message) in pushes {
            self.spawn_push(target_id, message, cycle.clone());
        }

        None
    }

    fn spawn_push(
        self: &Arc<Self>,
        target_id: TargetId,
        message: OperationMessage<U::Row>,
        cycle: Arc<Cycle>,
    ) {
        let inner = self.clone();
        self.runtime.spawn(async move {
            let result = inner.push(target_id, message).await;
            if let Some(continuation) = inner.complete_push(target_id, result, &cycle) {
                inner.continue_with(continuation).await;
            }
        });
    }

    async fn push(
        &self,
        target_id: TargetId,
        message: OperationMessage<U::Row>,
    ) -> ExchangeResult<PushAck> {
        self.operation.stats.record_push();
        if message.is_failure() {
            self.operation.stats.record_failure_notice();
        }

        // A panicking transport settles its leg as a failure instead of stalling the fan-in.
        match AssertUnwindSafe(self.channel.push(target_id, message))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => Err(exchange_error!(
                ErrorKind::TransportPanic,
                "Downstream push panicked",
                format!("push to target {target_id} panicked")
            )),
        }
    }

    /// Settles one push of `cycle`.
    ///
    /// Returns the follow-up action for the push that settled the cycle, [`None`] for every
    /// other one.
    fn complete_push(
        &self,
        target_id: TargetId,
        result: ExchangeResult<PushAck>,
        cycle: &Cycle,
    ) -> Option<Continuation> {
        let next_state = match (cycle.kind, result) {
            (CycleKind::Data { is_last }, Ok(ack)) => {
                debug!(
                    operation_id = %self.operation_id(),
                    sequence_index = cycle.sequence_index,
                    %target_id,
                    wants_more = ack.wants_more,
                    "target acknowledged cycle"
                );

                if is_last || !ack.wants_more {
                    TargetState::Done
                } else {
                    TargetState::Waiting
                }
            }
            (CycleKind::FailureNotice, Ok(_)) => TargetState::Done,
            (kind, Err(err)) => {
                self.operation.stats.record_push_failure(err.kind());

                match kind {
                    CycleKind::Data { .. } => error!(
                        operation_id = %self.operation_id(),
                        sequence_index = cycle.sequence_index,
                        %target_id,
                        error = %err,
                        "push to downstream target failed"
                    ),
                    // Failure notices are not retried.
                    CycleKind::FailureNotice => warn!(
                        operation_id = %self.operation_id(),
                        %target_id,
                        error = %err,
                        "failure notice could not be delivered"
                    ),
                }
                self.operation.record_failure(err);

                TargetState::Failed
            }
        };

        let target = &self.operation.targets()[target_id.index()];
        if !target.complete_push(next_state) {
            warn!(
                operation_id = %self.operation_id(),
                %target_id,
                state = %target.state(),
                "settled a push for a target that was not in flight"
            );
        }

        if !cycle.fan_in.arrive() {
            return None;
        }

        Some(self.after_cycle(cycle))
    }

    fn after_cycle(&self, cycle: &Cycle) -> Continuation {
        match cycle.kind {
            CycleKind::FailureNotice => Continuation::Finish,
            CycleKind::Data { is_last } if is_last || !self.operation.any_target_wants_more() => {
                Continuation::Finish
            }
            CycleKind::Data { .. } if self.operation.has_failed() => {
                Continuation::PropagateFailure
            }
            CycleKind::Data { .. } => Continuation::Pull,
        }
    }

    async fn close_upstream(&self) {
        if !self.upstream_closed.try_close() {
            return;
        }

        let mut state = self.pull.lock().await;
        state.upstream.close();

        debug!(operation_id = %self.operation_id(), "closed upstream");
    }

    /// Closes the upstream and resolves the completion with the recorded outcome.
    async fn finish(&self) {
        self.close_upstream().await;

        let Some(result) = self.operation.resolve_outcome() else {
            warn!(operation_id = %self.operation_id(), "distribution operation already resolved");
            return;
        };
        let outcome = match &result {
            Ok(()) => "succeeded",
            Err(err) if err.is_cancellation() => "canceled",
            Err(_) => "failed",
        };

        gauge!(EXCHANGE_ACTIVE_OPERATIONS).decrement(1.0);
        counter!(EXCHANGE_OPERATIONS_FINISHED_TOTAL, OUTCOME_LABEL => outcome).increment(1);

        let stats = self.operation.stats();
        info!(
            operation_id = %self.operation_id(),
            outcome,
            flush_cycles = stats.flush_cycles,
            rows_pulled = stats.rows_pulled,
            "distribution operation finished"
        );
    }
}
