use thiserror::Error;

use super::error_context::ErrorCode;

/// Node-level errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid input: {0}")]
    InputShapeError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Template error: {0}")]
    TemplateError(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("HTTP error: status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Code error: {0}")]
    CodeError(String),
    #[error("Item {index} failed: {message}")]
    ItemFailed { index: usize, message: String },
}

impl NodeError {
    /// Classification code used when the error is recorded on a step.
    pub fn code(&self) -> ErrorCode {
        match self {
            NodeError::ConfigError(_) => ErrorCode::ConfigError,
            NodeError::InputShapeError(_) => ErrorCode::InputShapeError,
            NodeError::TypeError(_) => ErrorCode::TypeError,
            NodeError::ExecutionError(_) | NodeError::ItemFailed { .. } => {
                ErrorCode::ExecutionError
            }
            NodeError::TemplateError(_) => ErrorCode::TemplateError,
            NodeError::Timeout(_) => ErrorCode::Timeout,
            NodeError::SerializationError(_) => ErrorCode::SerializationError,
            NodeError::HttpError(_) | NodeError::HttpStatus { .. } => ErrorCode::HttpError,
            NodeError::CodeError(_) => ErrorCode::CodeError,
        }
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::SerializationError(e.to_string())
    }
}
