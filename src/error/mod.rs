//! Error types for the workflow engine.
//!
//! - [`NodeError`]: Errors raised by a node's runtime contract or by an executor strategy.
//! - [`WorkflowError`]: Errors raised by the orchestrator, the workflow state and the flow DSL.
//! - [`ErrorContext`]: Serializable error record stored on a failed step.

pub mod error_context;
pub mod node_error;
pub mod workflow_error;

pub use error_context::{ErrorCode, ErrorContext};
pub use node_error::NodeError;
pub use workflow_error::WorkflowError;

/// Convenience alias for workflow-level results.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
/// Convenience alias for node-level results.
pub type NodeResult<T> = Result<T, NodeError>;
