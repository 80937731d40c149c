use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while turning wire text into frames (§4.1).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no <|start|> token found")]
    NoFrameStart,

    #[error("frame is missing the <|message|> token")]
    MissingMessageToken,

    #[error("frame is missing a terminator token (<|end|>, <|call|> or <|return|>)")]
    MissingTerminator,

    #[error("frame has an empty role")]
    EmptyRole,

    #[error("body is not valid JSON for the inferred content type: {0}")]
    InvalidJson(String),
}

impl ParseError {
    /// Stable `HRF_PARSE_*` code, as matched on by callers (§7).
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::NoFrameStart => "HRF_PARSE_NO_FRAME_START",
            ParseError::MissingMessageToken => "HRF_PARSE_MISSING_MESSAGE",
            ParseError::MissingTerminator => "HRF_PARSE_MISSING_TERMINATOR",
            ParseError::EmptyRole => "HRF_PARSE_EMPTY_ROLE",
            ParseError::InvalidJson(_) => "HRF_PARSE_INVALID_JSON",
        }
    }
}

/// Structured error returned by an injected [`crate::canon::SchemaValidator`].
///
/// Mirrors the teacher's `{code, message}` wire error shape, extended with
/// an optional `details` payload as spec.md §4.2 requires.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct SchemaError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl SchemaError {
    pub fn envelope_failed(message: impl Into<String>) -> Self {
        Self {
            code: "HRF_SCHEMA_ENVELOPE_FAILED".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn script_failed(message: impl Into<String>) -> Self {
        Self {
            code: "HRF_SCHEMA_SCRIPT_FAILED".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;
