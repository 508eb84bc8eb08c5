//! Coordination of distribution operations.
//!
//! A [`DistributionCoordinator`] owns the upstream source, the partitioner and the downstream
//! channel of one operation. Once started it runs without the caller: pulls happen on one task at
//! a time, pushes fan out concurrently, and the push completing last decides whether to pull
//! again, notify targets of a failure, or resolve the operation.
//!
//! [`DistributionOperation`] is the state shared by all of those tasks and by the caller's
//! [`DistributionHandle`].

mod distribution;
mod handle;
mod operation;
mod target;

pub use distribution::DistributionCoordinator;
pub use handle::DistributionHandle;
pub use operation::{DistributionOperation, OperationStatsSnapshot};
pub use target::{DownstreamTarget, TargetState};
