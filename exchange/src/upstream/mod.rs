//! Row sources distributed by the coordinator.

mod base;
pub mod memory;

pub use base::UpstreamSource;
