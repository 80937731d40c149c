//! Step interpreter, preflight analyzer, tool-call recorder and transcript
//! writer (spec.md §4.4–§4.7).

pub mod error;
pub mod interpreter;
pub mod preflight;
pub mod recorder;
pub mod transcript;

pub use error::ExecutionError;
pub use interpreter::{run_script, InterpreterOutcome};
pub use preflight::{required_recipients, run_preflight, PreflightReport};
pub use recorder::{RecordingToolService, ToolTrace, TraceSink};
pub use transcript::{normalize_role, preflight_blocked_summary, tool_summary};
