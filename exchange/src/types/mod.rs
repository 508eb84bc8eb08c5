//! Data types exchanged between the coordinator and its collaborators.

mod bucket;
mod ids;
mod message;
mod sized;

pub use bucket::*;
pub use ids::*;
pub use message::*;
pub use sized::*;
