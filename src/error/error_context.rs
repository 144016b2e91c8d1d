use serde::{Deserialize, Serialize};

/// Error classification code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ConfigError,
    InputShapeError,
    TypeError,
    ExecutionError,
    TemplateError,
    Timeout,
    SerializationError,
    HttpError,
    CodeError,
    DependencyFailed,
    InternalError,
}

/// Error record attached to a failed step run.
///
/// `code` is always `"runtime"` for step failures; the finer-grained
/// classification lives in `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

pub const RUNTIME_ERROR_CODE: &str = "runtime";

impl ErrorContext {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            code: RUNTIME_ERROR_CODE.to_string(),
            message: message.into(),
            kind: None,
            http_status: None,
        }
    }

    pub fn with_kind(mut self, kind: ErrorCode) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl From<&super::NodeError> for ErrorContext {
    fn from(err: &super::NodeError) -> Self {
        let ctx = ErrorContext::runtime(err.to_string()).with_kind(err.code());
        match err {
            super::NodeError::HttpStatus { status, .. } => ctx.with_http_status(*status),
            _ => ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;

    #[test]
    fn test_runtime_context_serialization() {
        let ctx = ErrorContext::runtime("bad input").with_kind(ErrorCode::InputShapeError);
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["code"], "runtime");
        assert_eq!(json["message"], "bad input");
        assert_eq!(json["kind"], "input_shape_error");
        assert!(json.get("http_status").is_none());
    }

    #[test]
    fn test_from_node_error() {
        let err = NodeError::HttpError("HTTP 500".into());
        let ctx = ErrorContext::from(&err);
        assert_eq!(ctx.code, RUNTIME_ERROR_CODE);
        assert_eq!(ctx.kind, Some(ErrorCode::HttpError));
        assert!(ctx.message.contains("HTTP 500"));
        assert_eq!(ctx.http_status, None);
    }

    #[test]
    fn test_http_status_carried() {
        let err = NodeError::HttpStatus {
            status: 404,
            message: "Not Found".into(),
        };
        let ctx = ErrorContext::from(&err);
        assert_eq!(ctx.http_status, Some(404));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["http_status"], 404);
    }
}
