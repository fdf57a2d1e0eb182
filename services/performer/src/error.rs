//! Task execution errors and their RPC status mapping

use performer_codec::CodecError;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Effective error category, resolved through stage wrappers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Execution,
    Cancelled,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum PerformerError {
    /// Malformed request or response shape; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Worker logic failed
    #[error("Execution error in task {task_id}: {message}")]
    Execution { task_id: String, message: String },

    #[error("Task {task_id} cancelled: {reason}")]
    Cancelled { task_id: String, reason: String },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Payload could not be decoded or encoded under the selected strategy
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A pipeline stage failed
    #[error("Stage '{stage}' failed after {elapsed_ms}ms: {source}")]
    Stage {
        stage: String,
        elapsed_ms: u64,
        #[source]
        source: Box<PerformerError>,
    },

    /// Untyped worker failure, normalised to `Execution` by the processor
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PerformerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn execution(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn stage(stage: impl Into<String>, elapsed_ms: u64, source: PerformerError) -> Self {
        Self::Stage {
            stage: stage.into(),
            elapsed_ms,
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Codec(_) => ErrorKind::Validation,
            Self::Execution { .. } | Self::Other(_) => ErrorKind::Execution,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Stage { source, .. } => source.kind(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Wrap untyped failures into `Execution` carrying the task id
    pub fn normalize(self, task_id: &str) -> Self {
        match self {
            Self::Other(e) => Self::execution(task_id, format!("{:#}", e)),
            Self::Stage {
                stage,
                elapsed_ms,
                source,
            } => Self::Stage {
                stage,
                elapsed_ms,
                source: Box::new(source.normalize(task_id)),
            },
            other => other,
        }
    }

    /// Innermost failure message, without stage prefixes
    pub fn root_message(&self) -> String {
        match self {
            Self::Stage { source, .. } => source.root_message(),
            other => other.to_string(),
        }
    }

    /// Rendered source chain, outermost first
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

pub type Result<T> = std::result::Result<T, PerformerError>;

/// RPC status codes used by the transport binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcCode {
    InvalidArgument,
    Internal,
    Cancelled,
    Unavailable,
    NotFound,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCode::InvalidArgument => "INVALID_ARGUMENT",
            RpcCode::Internal => "INTERNAL",
            RpcCode::Cancelled => "CANCELLED",
            RpcCode::Unavailable => "UNAVAILABLE",
            RpcCode::NotFound => "NOT_FOUND",
        }
    }

    /// HTTP status used when the code travels over the JSON binding
    pub fn http_status(&self) -> u16 {
        match self {
            RpcCode::InvalidArgument => 400,
            RpcCode::NotFound => 404,
            RpcCode::Cancelled => 499,
            RpcCode::Internal => 500,
            RpcCode::Unavailable => 503,
        }
    }
}

impl From<ErrorKind> for RpcCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => RpcCode::InvalidArgument,
            ErrorKind::Execution => RpcCode::Internal,
            ErrorKind::Cancelled => RpcCode::Cancelled,
            ErrorKind::Unavailable => RpcCode::Unavailable,
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned to RPC clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: RpcCode,
    pub message: String,
    /// Source chain, only in debug mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl RpcStatus {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_error(error: &PerformerError, debug: bool) -> Self {
        Self {
            code: error.kind().into(),
            message: error.to_string(),
            details: debug.then(|| error.chain()),
        }
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_resolves_through_stage() {
        let err = PerformerError::stage("request-validation", 3, PerformerError::validation("empty task_id"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.root_message(), "Validation error: empty task_id");
        assert!(err.to_string().contains("Stage 'request-validation' failed after 3ms"));
    }

    #[test]
    fn test_codec_errors_are_validation() {
        let err: PerformerError = CodecError::decode("json", "expected value").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(RpcCode::from(err.kind()), RpcCode::InvalidArgument);
    }

    #[test]
    fn test_normalize_wraps_untyped_errors() {
        let err = PerformerError::from(anyhow::anyhow!("division by zero")).normalize("t9");
        match err {
            PerformerError::Execution { task_id, message } => {
                assert_eq!(task_id, "t9");
                assert_eq!(message, "division by zero");
            }
            other => panic!("unexpected {:?}", other),
        }

        let staged = PerformerError::stage("custom", 1, anyhow::anyhow!("boom").into()).normalize("t9");
        assert!(matches!(
            staged,
            PerformerError::Stage { ref source, .. } if matches!(**source, PerformerError::Execution { .. })
        ));
    }

    #[test]
    fn test_rpc_status_mapping() {
        let cases = [
            (PerformerError::validation("x"), RpcCode::InvalidArgument, 400),
            (PerformerError::execution("t", "x"), RpcCode::Internal, 500),
            (PerformerError::cancelled("t", "x"), RpcCode::Cancelled, 499),
            (PerformerError::unavailable("x"), RpcCode::Unavailable, 503),
        ];
        for (err, code, http) in cases {
            let status = RpcStatus::from_error(&err, false);
            assert_eq!(status.code, code);
            assert_eq!(status.http_status(), http);
            assert!(status.details.is_none());
        }
    }

    #[test]
    fn test_debug_status_carries_chain() {
        let err = PerformerError::stage("metrics-start", 0, PerformerError::validation("bad"));
        let status = RpcStatus::from_error(&err, true);
        let details = status.details.clone().unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[1], "Validation error: bad");
        assert_eq!(serde_json::to_value(&status).unwrap()["code"], "INVALID_ARGUMENT");
    }
}
