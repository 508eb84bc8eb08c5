//! Configuration types and loading for the result exchange.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
