//! Workflow-level error types.

use super::NodeError;
use crate::dsl::validator::ValidationReport;
use thiserror::Error;

/// Workflow-level errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Flow parse error: {0}")]
    FlowParseError(String),
    #[error("Flow export error: {0}")]
    FlowExportError(String),
    #[error("Config file error: {0}")]
    ConfigFileError(String),
    #[error("Step not found: {0}")]
    StepNotFound(String),
    #[error("Duplicate step key: {0}")]
    DuplicateStep(String),
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),
    #[error("Duplicate edge id: {0}")]
    DuplicateEdge(String),
    #[error("Node executor not found for type: {0}")]
    ExecutorNotFound(String),
    #[error("Cycle detected in graph at step: {0}")]
    CycleDetected(String),
    #[error("Step {step} not run: dependency {dependency} failed: {message}")]
    DependencyFailed {
        step: String,
        dependency: String,
        message: String,
    },
    #[error("Step execution error: step={step}, error={error}")]
    StepFailed { step: String, error: String },
    #[error("Invalid config path: {0}")]
    InvalidConfigPath(String),
    #[error("Validation failed")]
    ValidationFailed(Box<ValidationReport>),
    #[error("Node error: {0}")]
    NodeError(Box<NodeError>),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<NodeError> for WorkflowError {
    fn from(value: NodeError) -> Self {
        WorkflowError::NodeError(Box::new(value))
    }
}
