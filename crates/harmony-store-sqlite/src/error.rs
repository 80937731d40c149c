use thiserror::Error;

/// Errors raised by the sqlite-backed stores. Mirrors the teacher's
/// `SessionError::Database(#[from] rusqlite::Error)` wrapping.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored row failed to decode: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
