//! Strategies assigning pulled rows to downstream targets.

mod base;
pub mod hash;
pub mod round_robin;

pub use base::BucketPartitioner;
pub use hash::HashPartitioner;
pub use round_robin::RoundRobinPartitioner;
