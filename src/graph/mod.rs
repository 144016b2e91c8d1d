//! Graph view over a flow.
//!
//! [`FlowGraph`] is built from the step list and edge list with petgraph and
//! answers the ordering questions the dispatcher asks: topological order,
//! ancestors of a step, and which edges feed or leave it.

pub mod builder;
pub mod types;

pub use builder::*;
pub use types::*;
