//! Expression and template evaluation for harmony scripts (spec.md §4.3).
//!
//! This crate is deliberately side-effect free: every function takes an
//! [`EvalContext`] and returns a value. The step interpreter (harmony-exec)
//! owns all control flow and mutation.

pub mod context;
pub mod error;
pub mod expr;
pub mod template;

pub use context::EvalContext;
pub use error::EvalError;
pub use expr::{eval_condition, eval_expr, eval_token, truthy, validate_expression_syntax};
pub use template::render_template;
