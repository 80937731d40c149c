//! Response DTOs (§6) projected by the session service.

use harmony_core::{CiMap, ScriptId, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{MessageExecutionRecord, SessionId, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub session_id: SessionId,
    pub script_id: ScriptId,
    pub executed_index: usize,
    pub next_index: usize,
    pub session_status: String,
    pub record: MessageExecutionRecord,
    pub outputs: Value,
    pub vars: CiMap<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub session_id: SessionId,
    pub script_id: ScriptId,
    pub current_index: usize,
    pub status: SessionStatus,
    pub created_at: String,
    pub updated_at: String,
    pub history_count: usize,
    pub artifact_count: usize,
    pub metadata: CiMap<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: SessionId,
    pub script_id: ScriptId,
    pub current_index: usize,
    pub status: SessionStatus,
    pub history: Vec<MessageExecutionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItemResponse {
    pub session_id: SessionId,
    pub script_id: ScriptId,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<MessageExecutionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<ScriptId>,
    pub session_ids: Vec<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

impl PageRequest {
    /// Clamp `limit` into `[1, 500]`, defaulting to 50 (§4.8).
    pub fn clamped_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}
