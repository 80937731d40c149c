use thiserror::Error;

/// Errors raised by the session service (C9, §7) and the store traits it
/// depends on.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("script not found: {0}")]
    ScriptNotFound(String),

    #[error("message index {index} out of range for envelope of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("envelope violates the canonical schema: {0}")]
    SchemaEnvelopeFailed(String),

    #[error("script violates the script schema: {0}")]
    SchemaScriptFailed(String),

    #[error(transparent)]
    Execution(#[from] harmony_exec::ExecutionError),

    #[error("unexpected error inside the session service: {0}")]
    ServiceError(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "SESSION_NOT_FOUND",
            SessionError::ScriptNotFound(_) => "SCRIPT_NOT_FOUND",
            SessionError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            SessionError::SchemaEnvelopeFailed(_) => "HRF_SCHEMA_ENVELOPE_FAILED",
            SessionError::SchemaScriptFailed(_) => "HRF_SCHEMA_SCRIPT_FAILED",
            SessionError::Execution(e) => e.code(),
            SessionError::ServiceError(_) => "EXECUTION_SERVICE_ERROR",
            SessionError::Cancelled => "CANCELLED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
