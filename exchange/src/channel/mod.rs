//! Transports pushing operation messages to downstream targets.

mod base;
pub mod memory;

pub use base::DownstreamChannel;
