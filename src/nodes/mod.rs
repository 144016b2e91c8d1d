//! Node executors, one per step type, and the helpers they share.

pub mod control_flow;
pub mod executor;
pub mod flow;
pub mod list;
pub mod transform;
pub mod unwrap;
pub mod utils;

pub use executor::*;
