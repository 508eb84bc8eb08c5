use std::collections::HashMap;
use std::time::Duration;

use exchange::channel::memory::MemoryChannel;
use exchange::coordinator::{DistributionCoordinator, TargetState};
use exchange::error::ErrorKind;
use exchange::partitioner::hash::hash_key;
use exchange::partitioner::{HashPartitioner, RoundRobinPartitioner};
use exchange::test_utils::paged_upstream::PagedUpstream;
use exchange::test_utils::scripted_channel::ScriptedChannel;
use exchange::types::{OperationId, TargetId};
use exchange::upstream::memory::VecUpstream;
use exchange_config::shared::DistributionConfig;
use exchange_telemetry::init_test_tracing;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{config_with_page_size, pages, round_robin_share, start_round_robin};

#[tokio::test(flavor = "multi_thread")]
async fn seven_rows_to_three_targets_flush_in_three_cycles() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let last_ack = channel.hold(TargetId(2), 3).await;
    let all_messages = channel.wait_for_messages(9).await;

    let handle = start_round_robin(
        config_with_page_size(3),
        3,
        PagedUpstream::new([(1..=7).collect()]),
        &channel,
    );
    let operation = handle.operation().clone();

    // The completion waits for the last acknowledgement of the last cycle.
    all_messages.notified().await;
    assert!(!handle.is_finished());
    last_ack.notify();

    handle.wait().await.unwrap();
    assert_eq!(operation.stats().flush_cycles, 3);
    assert!(operation.is_last());

    for target_id in [TargetId(0), TargetId(1), TargetId(2)] {
        let messages = channel.messages_for(target_id).await;
        let sequence_indexes = messages.iter().map(|m| m.sequence_index).collect::<Vec<_>>();
        let last_flags = messages.iter().map(|m| m.is_last).collect::<Vec<_>>();

        assert_eq!(sequence_indexes, vec![1, 2, 3]);
        assert_eq!(last_flags, vec![false, false, true]);
    }
    assert_eq!(channel.rows_for(TargetId(0)).await, vec![1, 4, 7]);
    assert_eq!(channel.rows_for(TargetId(1)).await, vec![2, 5]);
    assert_eq!(channel.rows_for(TargetId(2)).await, vec![3, 6]);
    assert!(
        operation
            .target_states()
            .iter()
            .all(|(_, state)| *state == TargetState::Done)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn every_row_reaches_its_assigned_target_exactly_once() {
    init_test_tracing();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..24 {
        let target_count = rng.gen_range(1..=5u32);
        let row_count = rng.gen_range(0..60u32);
        let page_size = rng.gen_range(1..=7usize);
        let upstream_page_len = rng.gen_range(1..=9usize);
        let rows = (1..=row_count).collect::<Vec<_>>();

        let channel = ScriptedChannel::new();
        let handle = start_round_robin(
            config_with_page_size(page_size),
            target_count,
            PagedUpstream::new(pages(&rows, upstream_page_len)),
            &channel,
        );
        let operation = handle.operation().clone();
        handle.wait().await.unwrap();

        for id in 0..target_count {
            let target_id = TargetId(id);
            assert_eq!(
                channel.rows_for(target_id).await,
                round_robin_share(&rows, target_count, target_id),
                "target {target_id} of {target_count}, page size {page_size}"
            );
        }
        assert_eq!(operation.stats().rows_pulled, row_count as u64);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cycles_never_overlap_under_random_ack_order() {
    init_test_tracing();

    for seed in 0..8 {
        let channel = ScriptedChannel::with_random_delays(seed, Duration::from_millis(2));
        let rows = (1..=40).collect::<Vec<_>>();

        let handle = start_round_robin(
            config_with_page_size(3),
            4,
            PagedUpstream::new(pages(&rows, 5)),
            &channel,
        );
        handle.wait().await.unwrap();

        assert_eq!(channel.overlapping_pushes().await, 0, "seed {seed}");
        assert_eq!(channel.concurrent_target_pushes().await, 0, "seed {seed}");

        for id in 0..4 {
            let sequence_indexes = channel
                .messages_for(TargetId(id))
                .await
                .iter()
                .map(|message| message.sequence_index)
                .collect::<Vec<_>>();
            let expected = (1..=sequence_indexes.len() as u64).collect::<Vec<_>>();
            assert_eq!(sequence_indexes, expected, "seed {seed}");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_sharing_a_key_land_on_the_same_target() {
    init_test_tracing();

    let rows = (0..40u32).map(|value| (value % 5, value)).collect::<Vec<_>>();
    let channel = ScriptedChannel::new();
    let partitioner = HashPartitioner::new(|row: &(u32, u32)| hash_key(&row.0));

    let handle = DistributionCoordinator::new(
        OperationId(7),
        config_with_page_size(6),
        3,
        PagedUpstream::new([rows.clone()]),
        partitioner,
        channel.clone(),
    )
    .start()
    .unwrap();
    handle.wait().await.unwrap();

    let mut owners = HashMap::new();
    let mut delivered = 0;
    for id in 0..3 {
        for (key, _) in channel.rows_for(TargetId(id)).await {
            delivered += 1;
            assert_eq!(*owners.entry(key).or_insert(id), id, "key {key}");
        }
    }
    assert_eq!(delivered, rows.len());
}

#[tokio::test(flavor = "multi_thread")]
async fn byte_budget_triggers_flushes_before_page_size() {
    init_test_tracing();

    let config = DistributionConfig {
        page_size: 100,
        // Two `u32` rows.
        max_bucket_bytes: 8,
        ..DistributionConfig::default()
    };
    let channel = ScriptedChannel::new();
    let handle = start_round_robin(config, 1, PagedUpstream::new([(1..=6).collect()]), &channel);
    let operation = handle.operation().clone();
    handle.wait().await.unwrap();

    let batch_sizes = channel
        .messages_for(TargetId(0))
        .await
        .iter()
        .map(|message| message.rows.len())
        .collect::<Vec<_>>();
    assert_eq!(batch_sizes, vec![2, 2, 2]);
    assert_eq!(operation.stats().flush_cycles, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn long_single_target_stream_completes_across_reschedules() {
    init_test_tracing();

    let config = DistributionConfig {
        page_size: 1,
        max_inline_cycles: 3,
        ..DistributionConfig::default()
    };
    let rows = (1..=200).collect::<Vec<_>>();
    let channel = ScriptedChannel::new();
    let handle = start_round_robin(config, 1, PagedUpstream::new(pages(&rows, 7)), &channel);
    let operation = handle.operation().clone();
    handle.wait().await.unwrap();

    assert_eq!(channel.rows_for(TargetId(0)).await, rows);
    assert_eq!(operation.stats().flush_cycles, 200);
    assert_eq!(channel.overlapping_pushes().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_upstream_sends_one_last_cycle() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let upstream = PagedUpstream::new(Vec::<Vec<u32>>::new());
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(4), 2, upstream, &channel);
    handle.wait().await.unwrap();

    for id in 0..2 {
        let messages = channel.messages_for(TargetId(id)).await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_last);
        assert!(messages[0].rows.is_empty());
    }
    assert_eq!(tracker.close_calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_targets_finish_without_pulling() {
    init_test_tracing();

    let channel = ScriptedChannel::new();
    let upstream = PagedUpstream::new([(1..=5).collect()]);
    let tracker = upstream.tracker();
    let handle = start_round_robin(config_with_page_size(2), 0, upstream, &channel);
    handle.wait().await.unwrap();

    assert_eq!(tracker.rows_served(), 0);
    assert_eq!(tracker.close_calls(), 1);
    assert!(channel.messages().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn memory_channel_collects_every_row() {
    init_test_tracing();

    let channel = MemoryChannel::new();
    let handle = DistributionCoordinator::new(
        OperationId(1),
        config_with_page_size(4),
        2,
        VecUpstream::paged((1..=10u32).collect(), 3),
        RoundRobinPartitioner::new(),
        channel.clone(),
    )
    .start()
    .unwrap();
    handle.wait().await.unwrap();

    assert_eq!(channel.rows(TargetId(0)).await, vec![1, 3, 5, 7, 9]);
    assert_eq!(channel.rows(TargetId(1)).await, vec![2, 4, 6, 8, 10]);
    assert!(channel.is_finished(TargetId(0)).await);
    assert!(channel.is_finished(TargetId(1)).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_is_rejected_at_start() {
    let channel = ScriptedChannel::new();
    let config = DistributionConfig {
        max_bucket_bytes: 0,
        ..DistributionConfig::default()
    };

    let err = DistributionCoordinator::new(
        OperationId(1),
        config,
        2,
        PagedUpstream::new([vec![1u32]]),
        RoundRobinPartitioner::new(),
        channel,
    )
    .start()
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(err.detail().unwrap().contains("distribution.max_bucket_bytes"));
}

#[test]
fn starting_outside_a_runtime_fails() {
    let err = DistributionCoordinator::new(
        OperationId(1),
        DistributionConfig::default(),
        1,
        PagedUpstream::new([vec![1u32]]),
        RoundRobinPartitioner::new(),
        ScriptedChannel::new(),
    )
    .start()
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}
