use thiserror::Error;

/// Structured execution errors (§7). `code()` mirrors the teacher's
/// `SkynetError::code()` convention of a stable machine-matchable string per
/// variant.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("envelope has no script but execution expects one")]
    MissingScript,

    #[error("script has zero steps")]
    NoSteps,

    #[error("execution error: {kind}: {message}")]
    Execution { kind: String, message: String },
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::MissingScript => "MISSING_HARMONY_SCRIPT",
            ExecutionError::NoSteps => "NO_HARMONY_STEPS",
            ExecutionError::Execution { .. } => "HRF_EXECUTION_ERROR",
        }
    }

    pub fn invalid_syntax() -> Self {
        ExecutionError::Execution {
            kind: "InvalidOperation".to_string(),
            message: "Invalid expression syntax".to_string(),
        }
    }

    pub fn channel_violation(expected: &str) -> Self {
        ExecutionError::Execution {
            kind: "InvalidOperation".to_string(),
            message: format!("step requires channel={expected}"),
        }
    }

    pub fn tool_failed(recipient: &str, message: impl Into<String>) -> Self {
        ExecutionError::Execution {
            kind: "ToolInvocationFailed".to_string(),
            message: format!("{recipient}: {}", message.into()),
        }
    }

    pub fn chat_failed(message: impl Into<String>) -> Self {
        ExecutionError::Execution {
            kind: "ChatServiceFailed".to_string(),
            message: message.into(),
        }
    }

    pub fn decode_failed(message: impl Into<String>) -> Self {
        ExecutionError::Execution {
            kind: "JsonDecode".to_string(),
            message: message.into(),
        }
    }
}

impl From<harmony_eval::EvalError> for ExecutionError {
    fn from(_: harmony_eval::EvalError) -> Self {
        ExecutionError::invalid_syntax()
    }
}
