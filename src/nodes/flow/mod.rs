//! Flow-shaping node executors: Loop and Merge.
//!
//! Loop only plans batches here; the per-item fan-out to its downstream
//! step is driven by [`crate::core::executors`].

pub mod loop_node;
pub mod merge;

pub use loop_node::LoopNodeExecutor;
pub use merge::MergeNodeExecutor;
