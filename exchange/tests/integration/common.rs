use exchange::coordinator::{DistributionCoordinator, DistributionHandle};
use exchange::partitioner::RoundRobinPartitioner;
use exchange::test_utils::paged_upstream::PagedUpstream;
use exchange::test_utils::scripted_channel::ScriptedChannel;
use exchange::types::{OperationId, TargetId};
use exchange_config::shared::DistributionConfig;

pub fn config_with_page_size(page_size: usize) -> DistributionConfig {
    DistributionConfig {
        page_size,
        ..DistributionConfig::default()
    }
}

/// Starts a round-robin distribution of `upstream` to `target_count` targets through `channel`.
pub fn start_round_robin(
    config: DistributionConfig,
    target_count: u32,
    upstream: PagedUpstream<u32>,
    channel: &ScriptedChannel<u32>,
) -> DistributionHandle {
    DistributionCoordinator::new(
        OperationId(rand::random()),
        config,
        target_count,
        upstream,
        RoundRobinPartitioner::new(),
        channel.clone(),
    )
    .start()
    .unwrap()
}

/// Rows a round-robin partitioner assigns to `target_id` over the whole operation.
pub fn round_robin_share(rows: &[u32], target_count: u32, target_id: TargetId) -> Vec<u32> {
    rows.iter()
        .enumerate()
        .filter(|(position, _)| *position % target_count as usize == target_id.index())
        .map(|(_, row)| *row)
        .collect()
}

/// Splits `rows` into pages of `page_len` rows.
pub fn pages(rows: &[u32], page_len: usize) -> Vec<Vec<u32>> {
    rows.chunks(page_len.max(1)).map(<[u32]>::to_vec).collect()
}
