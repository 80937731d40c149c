use thiserror::Error;

/// Errors raised purely by expression/template evaluation. The step
/// interpreter (C5) wraps these into the `HRF_EXECUTION_ERROR` structured
/// error spec.md §7 names; this crate has no opinion on error codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("Invalid expression syntax")]
    InvalidSyntax,
}
