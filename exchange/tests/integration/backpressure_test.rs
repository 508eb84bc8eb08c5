use exchange::coordinator::TargetState;
use exchange::test_utils::paged_upstream::PagedUpstream;
use exchange::test_utils::scripted_channel::{ScriptedChannel, ScriptedResponse};
use exchange::types::{PushAck, TargetId};
use exchange_telemetry::init_test_tracing;

use crate::common::{config_with_page_size, pages, start_round_robin};

#[tokio::test(flavor = "multi_thread")]
async fn withdrawn_target_receives_a_single_push() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel
        .respond(TargetId(1), 1, ScriptedResponse::Ack(PushAck::DONE))
        .await;

    let handle = start_round_robin(
        config_with_page_size(3),
        3,
        PagedUpstream::new([(1..=9).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();
    handle.wait().await.unwrap();

    assert_eq!(operation.stats().flush_cycles, 3);
    assert_eq!(channel.push_count(TargetId(0)).await, 3);
    assert_eq!(channel.push_count(TargetId(1)).await, 1);
    assert_eq!(channel.push_count(TargetId(2)).await, 3);
    assert!(
        channel
            .messages()
            .await
            .iter()
            .filter(|message| message.sequence_index > 1)
            .all(|message| message.target_id != TargetId(1))
    );
    assert_eq!(operation.targets()[1].pushes(), 1);
    assert_eq!(operation.targets()[1].state(), TargetState::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_waits_for_the_last_remaining_target() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel
        .respond(TargetId(0), 1, ScriptedResponse::Ack(PushAck::DONE))
        .await;
    let fourth_ack = channel.hold(TargetId(1), 4).await;
    // One push to the first target, four to the second.
    let all_messages = channel.wait_for_messages(5).await;

    let handle = start_round_robin(
        config_with_page_size(2),
        2,
        PagedUpstream::new([(1..=8).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();

    all_messages.notified().await;
    assert!(!handle.is_finished());
    assert_eq!(operation.targets()[1].state(), TargetState::InFlight);
    fourth_ack.notify();

    handle.wait().await.unwrap();
    assert_eq!(channel.push_count(TargetId(0)).await, 1);
    assert_eq!(channel.push_count(TargetId(1)).await, 4);

    let second_target = channel.messages_for(TargetId(1)).await;
    assert!(second_target[3].is_last);
    assert_eq!(channel.rows_for(TargetId(1)).await, vec![2, 4, 6, 8]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pulling_stops_once_every_target_withdrew() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    for id in 0..2 {
        channel
            .respond(TargetId(id), 1, ScriptedResponse::Ack(PushAck::DONE))
            .await;
    }

    let rows = (1..=20).collect::<Vec<_>>();
    let upstream = PagedUpstream::new(pages(&rows, 4));
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(2), 2, upstream, &channel);
    let operation = handle.operation().clone();
    handle.wait().await.unwrap();

    assert_eq!(operation.stats().flush_cycles, 1);
    assert_eq!(tracker.rows_served(), 2);
    assert_eq!(tracker.close_calls(), 1);
    assert!(!operation.is_last());
}

#[tokio::test(flavor = "multi_thread")]
async fn targets_withdrawing_at_different_cycles_are_skipped_independently() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    channel
        .respond(TargetId(0), 2, ScriptedResponse::Ack(PushAck::DONE))
        .await;
    channel
        .respond(TargetId(2), 3, ScriptedResponse::Ack(PushAck::DONE))
        .await;

    let handle = start_round_robin(
        config_with_page_size(3),
        3,
        PagedUpstream::new([(1..=15).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();
    handle.wait().await.unwrap();

    assert_eq!(channel.push_count(TargetId(0)).await, 2);
    assert_eq!(channel.push_count(TargetId(1)).await, 5);
    assert_eq!(channel.push_count(TargetId(2)).await, 3);
    assert_eq!(operation.stats().flush_cycles, 5);
    assert_eq!(channel.overlapping_pushes().await, 0);
}
