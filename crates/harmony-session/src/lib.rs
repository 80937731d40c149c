//! Session service (spec.md §4.8): per-session lock, pointer advancement,
//! idempotency, history, artifacts, status transitions, paging. Composes
//! the wire/canon layer (`harmony-core`), the evaluator (`harmony-eval`) and
//! the step interpreter (`harmony-exec`) behind a single driving algorithm.

pub mod dto;
pub mod engine;
pub mod error;
pub mod lock;
pub mod model;
pub mod service;
pub mod store;

pub use dto::{
    ExecuteResponse, HistoryItemResponse, HistoryResponse, PageRequest, SessionListResponse,
    StatusResponse,
};
pub use engine::Engine;
pub use error::{Result, SessionError};
pub use lock::{LockProvider, SessionLockGuard};
pub use model::{
    Artifact, ArtifactContentType, ChatEntry, MessageExecutionRecord, RecordStatus, Session,
    SessionId, SessionStatus, StructuredError,
};
pub use service::SessionService;
pub use store::{
    parse_continuation_token, InMemoryScriptStore, InMemorySessionIndexStore, InMemorySessionStore,
    ScriptStore, SessionIndexStore, SessionStore,
};
