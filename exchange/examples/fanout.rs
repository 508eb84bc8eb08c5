//! Fans a stream of generated rows out to four in-memory targets.
//!
//! Configuration is read from `configuration/base.yaml` (plus the file of the current
//! `APP_ENVIRONMENT`) when present, and overridable with variables such as
//! `APP_DISTRIBUTION__PAGE_SIZE=64`. Without configuration files the defaults apply.

use std::error::Error;

use exchange::channel::memory::MemoryChannel;
use exchange::coordinator::DistributionCoordinator;
use exchange::partitioner::RoundRobinPartitioner;
use exchange::types::{OperationId, TargetId};
use exchange::upstream::memory::VecUpstream;
use exchange_config::load_config;
use exchange_config::shared::ExchangeConfig;
use exchange_telemetry::init_tracing;
use tracing::{info, warn};

const TARGET_COUNT: u32 = 4;

const ROW_COUNT: u64 = 10_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing("fanout")?;

    let config = match load_config::<ExchangeConfig>() {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "no usable configuration found, using defaults");
            ExchangeConfig::default()
        }
    };
    config.validate()?;

    let rows = (0..ROW_COUNT).map(|id| format!("row-{id}")).collect::<Vec<_>>();
    let channel = MemoryChannel::new();

    let handle = DistributionCoordinator::new(
        OperationId(1),
        config.distribution,
        TARGET_COUNT,
        VecUpstream::paged(rows, 1_000),
        RoundRobinPartitioner::new(),
        channel.clone(),
    )
    .start()?;
    let operation = handle.operation().clone();

    handle.wait().await?;

    let stats = operation.stats();
    info!(
        flush_cycles = stats.flush_cycles,
        rows_pulled = stats.rows_pulled,
        pushes_sent = stats.pushes_sent,
        "distribution finished"
    );
    for id in 0..TARGET_COUNT {
        let target_id = TargetId(id);
        info!(
            %target_id,
            rows = channel.rows(target_id).await.len(),
            pushes = channel.pushes(target_id).await,
            "target summary"
        );
    }

    Ok(())
}
