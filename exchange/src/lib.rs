//! Distribution of an upstream row stream to a fixed set of downstream targets.
//!
//! Rows are pulled from an [`upstream::UpstreamSource`], split into one
//! [`types::Bucket`] per target by a [`partitioner::BucketPartitioner`], and pushed through a
//! [`channel::DownstreamChannel`]. See [`coordinator::DistributionCoordinator`] for the flow of
//! an operation.

pub mod channel;
pub mod concurrency;
pub mod coordinator;
pub mod error;
pub mod failpoints;
mod macros;
pub mod metrics;
pub mod partitioner;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod upstream;
