//! Configuration types shared by every exchange component.

mod base;
mod distribution;
mod exchange;

pub use base::ValidationError;
pub use distribution::DistributionConfig;
pub use exchange::ExchangeConfig;
