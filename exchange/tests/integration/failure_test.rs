use std::sync::{Arc, OnceLock};
use std::time::Duration;

use exchange::coordinator::{DistributionCoordinator, DistributionOperation, TargetState};
use exchange::error::{ErrorKind, ExchangeResult};
use exchange::exchange_error;
use exchange::partitioner::{BucketPartitioner, RoundRobinPartitioner};
use exchange::test_utils::paged_upstream::PagedUpstream;
use exchange::test_utils::scripted_channel::{ScriptedChannel, ScriptedResponse};
use exchange::types::{Bucket, OperationId, PushAck, TargetId};
use exchange_telemetry::init_test_tracing;

use crate::common::{config_with_page_size, pages, start_round_robin};

/// Round-robin partitioner canceling the operation when it is handed `cancel_on`.
struct CancelingPartitioner {
    inner: RoundRobinPartitioner<u32>,
    cancel_on: u32,
    operation: Arc<OnceLock<Arc<DistributionOperation>>>,
}

impl BucketPartitioner for CancelingPartitioner {
    type Row = u32;

    fn add(&mut self, row: u32) -> ExchangeResult<()> {
        if row == self.cancel_on {
            self.operation
                .get()
                .expect("operation registered before the row is pulled")
                .cancel();
        }

        self.inner.add(row)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn estimated_bytes(&self) -> usize {
        self.inner.estimated_bytes()
    }

    fn build(&mut self, target_count: usize) -> ExchangeResult<Vec<Bucket<u32>>> {
        self.inner.build(target_count)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_failure_notifies_each_waiting_target_once() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel
        .respond(TargetId(0), 1, ScriptedResponse::Ack(PushAck::DONE))
        .await;

    let rows = (1..=10).collect::<Vec<_>>();
    // Five pages, the load of the third one fails.
    let upstream = PagedUpstream::new(pages(&rows, 2)).fail_on_load(2);
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(2), 3, upstream, &channel);
    let operation = handle.operation().clone();

    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFailed);
    assert!(err.is_upstream());

    assert_eq!(tracker.close_calls(), 1);
    assert_eq!(tracker.rows_served(), 4);
    assert_eq!(operation.stats().flush_cycles, 2);

    let notices = channel.failure_notices().await;
    let mut notified = notices.iter().map(|(target_id, _)| *target_id).collect::<Vec<_>>();
    notified.sort();
    assert_eq!(notified, vec![TargetId(1), TargetId(2)]);
    assert!(notices.iter().all(|(_, failure)| *failure == err));

    for id in 1..3 {
        let messages = channel.messages_for(TargetId(id)).await;
        let notice = messages.last().unwrap();
        assert!(notice.is_failure());
        assert!(notice.is_last);
        assert!(notice.rows.is_empty());
        assert_eq!(notice.sequence_index, 3);
    }
    assert_eq!(operation.targets()[0].state(), TargetState::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_row_read_fails_the_operation() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let upstream = PagedUpstream::new([(1..=6).collect()]).fail_on_row(4);
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(3), 2, upstream, &channel);

    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFailed);
    assert_eq!(tracker.close_calls(), 1);
    assert_eq!(channel.failure_notices().await.len(), 2);
    // Only the first cycle was delivered.
    assert_eq!(channel.rows_for(TargetId(0)).await, vec![1, 3]);
    assert_eq!(channel.rows_for(TargetId(1)).await, vec![2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_upstream_fails_the_operation() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let upstream = PagedUpstream::new([(1..=6).collect()]).panic_on_row(4);
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(3), 2, upstream, &channel);
    let operation = handle.operation().clone();

    let err = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("operation resolves after the upstream panicked")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFailed);

    tracker.wait_for_close().await;
    assert_eq!(tracker.close_calls(), 1);
    assert_eq!(tracker.rows_served(), 3);
    assert_eq!(operation.stats().flush_cycles, 1);

    let notices = channel.failure_notices().await;
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|(_, failure)| *failure == err));
}

#[tokio::test(flavor = "multi_thread")]
async fn transport_failure_stops_data_and_notifies_other_targets() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel
        .respond(
            TargetId(0),
            2,
            ScriptedResponse::Fail(exchange_error!(
                ErrorKind::TransportFailed,
                "Connection to target reset"
            )),
        )
        .await;

    let upstream = PagedUpstream::new([(1..=9).collect()]);
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(3), 3, upstream, &channel);
    let operation = handle.operation().clone();

    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailed);
    assert!(err.is_transport());

    let stats = operation.stats();
    assert_eq!(stats.flush_cycles, 2);
    assert_eq!(stats.push_failures, 1);
    assert_eq!(stats.failure_notices, 2);
    assert_eq!(tracker.close_calls(), 1);

    assert_eq!(operation.targets()[0].state(), TargetState::Failed);
    assert_eq!(channel.push_count(TargetId(0)).await, 2);
    for id in 1..3 {
        let messages = channel.messages_for(TargetId(id)).await;
        assert_eq!(messages.len(), 3);
        assert!(messages[2].is_failure());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn first_recorded_failure_wins() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel
        .respond(
            TargetId(0),
            1,
            ScriptedResponse::Fail(exchange_error!(ErrorKind::TransportFailed, "First failure")),
        )
        .await;
    channel
        .respond(
            TargetId(1),
            1,
            ScriptedResponse::Fail(exchange_error!(ErrorKind::TransportFailed, "Second failure")),
        )
        .await;
    let second_failure = channel.hold(TargetId(1), 1).await;

    let handle = start_round_robin(
        config_with_page_size(3),
        3,
        PagedUpstream::new([(1..=9).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();

    tokio::time::timeout(Duration::from_secs(10), async {
        while operation.failure().is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    second_failure.notify();

    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.description(), "First failure");
    assert_eq!(operation.stats().push_failures, 2);

    let notices = channel.failure_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, TargetId(2));
    assert_eq!(notices[0].1.description(), "First failure");
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_push_fails_the_operation() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel.respond(TargetId(1), 1, ScriptedResponse::Panic).await;

    let handle = start_round_robin(
        config_with_page_size(2),
        2,
        PagedUpstream::new([(1..=6).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();

    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportPanic);
    assert_eq!(operation.targets()[1].state(), TargetState::Failed);

    let notices = channel.failure_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, TargetId(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn undeliverable_failure_notice_is_not_retried() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel
        .respond(
            TargetId(0),
            1,
            ScriptedResponse::Fail(exchange_error!(ErrorKind::TransportFailed, "Target down")),
        )
        .await;
    channel
        .respond(
            TargetId(1),
            2,
            ScriptedResponse::Fail(exchange_error!(ErrorKind::TransportFailed, "Notice lost")),
        )
        .await;

    let handle = start_round_robin(
        config_with_page_size(2),
        2,
        PagedUpstream::new([(1..=6).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();

    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.description(), "Target down");
    assert_eq!(channel.push_count(TargetId(1)).await, 2);
    assert_eq!(operation.stats().push_failures, 2);
    assert_eq!(operation.targets()[1].state(), TargetState::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_while_upstream_is_suspended() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let first_cycle = channel.wait_for_messages(2).await;

    let mut upstream = PagedUpstream::new([vec![1, 2], vec![3, 4]]);
    // Never released, the second page stays pending until the operation is canceled.
    let _load_gate = upstream.gate_loads();
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(2), 2, upstream, &channel);
    let operation = handle.operation().clone();

    first_cycle.notified().await;
    handle.cancel();

    let err = handle.wait().await.unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(tracker.close_calls(), 1);
    assert_eq!(operation.stats().flush_cycles, 1);

    let notices = channel.failure_notices().await;
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|(_, failure)| failure.is_cancellation()));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_lets_in_flight_pushes_complete() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let held = channel.hold(TargetId(0), 1).await;
    let first_cycle = channel.wait_for_messages(2).await;

    let handle = start_round_robin(
        config_with_page_size(2),
        2,
        PagedUpstream::new([(1..=8).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();

    first_cycle.notified().await;
    operation.cancel();
    assert!(!handle.is_finished());
    held.notify();

    let err = handle.wait().await.unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(operation.stats().flush_cycles, 1);

    // Both targets acknowledged the first cycle, then got the cancellation.
    for id in 0..2 {
        let messages = channel.messages_for(TargetId(id)).await;
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].is_failure());
        assert!(messages[1].is_failure());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_while_pulling_discards_the_cycle() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    // Keeps the first cycle open until the partitioner can reach the operation.
    let held = channel.hold(TargetId(0), 1).await;

    let registered = Arc::new(OnceLock::new());
    let partitioner = CancelingPartitioner {
        inner: RoundRobinPartitioner::new(),
        cancel_on: 4,
        operation: registered.clone(),
    };
    let handle = DistributionCoordinator::new(
        OperationId(7),
        config_with_page_size(2),
        2,
        PagedUpstream::new([(1..=8).collect()]),
        partitioner,
        channel.clone(),
    )
    .start()
    .unwrap();
    let operation = handle.operation().clone();
    registered.set(operation.clone()).unwrap();
    held.notify();

    let err = handle.wait().await.unwrap_err();
    assert!(err.is_cancellation());

    // Rows 3 and 4 were pulled but never sent.
    let stats = operation.stats();
    assert_eq!(stats.flush_cycles, 1);
    assert_eq!(stats.rows_pulled, 4);

    for id in 0..2 {
        let messages = channel.messages_for(TargetId(id)).await;
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].is_failure());
        assert_eq!(messages[0].sequence_index, 1);
        assert!(messages[1].is_failure());
        assert_eq!(messages[1].sequence_index, 2);
    }
    assert_eq!(channel.rows_for(TargetId(0)).await, vec![1]);
    assert_eq!(channel.rows_for(TargetId(1)).await, vec![2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_after_completion_is_a_no_op() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let handle = start_round_robin(
        config_with_page_size(2),
        2,
        PagedUpstream::new([(1..=4).collect()]),
        &channel,
    );
    let (operation, completion) = handle.into_parts();

    completion.await.unwrap();
    operation.cancel();

    assert!(operation.is_finished());
    assert!(operation.failure().is_none());
    assert!(channel.failure_notices().await.is_empty());
}
