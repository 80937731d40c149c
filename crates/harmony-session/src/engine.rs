//! Composition root (§6 supplement). Wires a `ScriptStore` + `SessionStore` +
//! `SessionIndexStore` + `LockProvider` + `ChatService` + `ToolService` +
//! `ToolAvailability` into the eight session operations spec.md §4.8 names.
//!
//! Grounded in the teacher's `AppState`/`AgentRuntime` "central shared state"
//! idiom (`skynet-gateway::app::AppState::new`): a thin struct gathering the
//! collaborators a call site needs, with no behavior of its own beyond
//! delegation to [`SessionService`].

use std::sync::Arc;

use harmony_core::{ChatService, Envelope, ScriptId, ToolAvailability, ToolService};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::dto::{
    ExecuteResponse, HistoryItemResponse, HistoryResponse, PageRequest, SessionListResponse,
    StatusResponse,
};
use crate::error::Result;
use crate::lock::LockProvider;
use crate::model::{Session, SessionId};
use crate::service::SessionService;
use crate::store::{
    InMemoryScriptStore, InMemorySessionIndexStore, InMemorySessionStore, ScriptStore,
    SessionIndexStore, SessionStore,
};

/// Library-only entry point (no CLI/HTTP transport — out of scope per
/// spec.md §1). Holds one [`SessionService`] and forwards every public
/// operation to it.
pub struct Engine {
    service: SessionService,
}

impl Engine {
    pub fn new(
        scripts: Arc<dyn ScriptStore>,
        sessions: Arc<dyn SessionStore>,
        index: Arc<dyn SessionIndexStore>,
        locks: Arc<LockProvider>,
        availability: Arc<dyn ToolAvailability>,
        tools: Arc<dyn ToolService>,
        chat: Arc<dyn ChatService>,
    ) -> Self {
        Self {
            service: SessionService::new(scripts, sessions, index, locks, availability, tools, chat),
        }
    }

    /// Wire the in-memory reference stores from §6 against real
    /// chat/tool/availability collaborators — the common case for tests and
    /// single-process deployments that don't need the durable sqlite store.
    pub fn in_memory(
        availability: Arc<dyn ToolAvailability>,
        tools: Arc<dyn ToolService>,
        chat: Arc<dyn ChatService>,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryScriptStore::new()),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemorySessionIndexStore::new()),
            Arc::new(LockProvider::new()),
            availability,
            tools,
            chat,
        )
    }

    pub async fn register_script(&self, script_id: ScriptId, envelope: Envelope) -> Result<()> {
        self.service.register_script(script_id, envelope).await
    }

    pub async fn start_session(&self, script_id: ScriptId) -> Result<Session> {
        self.service.start_session(script_id).await
    }

    pub async fn execute_next(
        &self,
        session_id: &SessionId,
        execution_id: Option<String>,
    ) -> Result<ExecuteResponse> {
        self.service.execute_next(session_id, execution_id).await
    }

    pub async fn execute_message(
        &self,
        session_id: &SessionId,
        index: usize,
        input: Value,
        execution_id: Option<String>,
    ) -> Result<ExecuteResponse> {
        self.service.execute_message(session_id, index, input, execution_id).await
    }

    /// Cancellable counterpart to [`execute_next`](Self::execute_next) — aborts
    /// with `SessionError::Cancelled` rather than persisting a mutation if
    /// `cancel` fires before the lock is granted or before the save (§5).
    pub async fn execute_next_cancellable(
        &self,
        session_id: &SessionId,
        execution_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<ExecuteResponse> {
        self.service.execute_next_cancellable(session_id, execution_id, cancel).await
    }

    /// Cancellable counterpart to [`execute_message`](Self::execute_message).
    pub async fn execute_message_cancellable(
        &self,
        session_id: &SessionId,
        index: usize,
        input: Value,
        execution_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<ExecuteResponse> {
        self.service.execute_message_cancellable(session_id, index, input, execution_id, cancel).await
    }

    pub async fn get_status(&self, session_id: &SessionId) -> Result<StatusResponse> {
        self.service.get_status(session_id).await
    }

    pub async fn get_history(&self, session_id: &SessionId) -> Result<HistoryResponse> {
        self.service.get_history(session_id).await
    }

    pub async fn get_history_item(&self, session_id: &SessionId, index: usize) -> Result<HistoryItemResponse> {
        self.service.get_history_item(session_id, index).await
    }

    pub async fn list_sessions(&self, script_id: Option<&ScriptId>, page: PageRequest) -> Result<SessionListResponse> {
        self.service.list_sessions(script_id, page).await
    }

    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.service.delete_session(session_id).await
    }
}
