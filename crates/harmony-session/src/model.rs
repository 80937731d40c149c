//! Session runtime model (§3): mutable state the engine owns once a script
//! has been registered and a session started against it. Newtype idiom for
//! ids mirrors the teacher's `UserId`/`SessionKey` pattern.

use std::fmt;

use harmony_core::CiMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SessionStatus {
    Created,
    Running,
    Blocked,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "Created",
            SessionStatus::Running => "Running",
            SessionStatus::Blocked => "Blocked",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
            SessionStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactContentType {
    Text,
    Json,
    ToolTrace,
    Preflight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub content_type: ArtifactContentType,
    pub content: Value,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

impl Artifact {
    pub fn new(
        name: impl Into<String>,
        content_type: ArtifactContentType,
        content: Value,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type,
            content,
            created_at: created_at.into(),
            producer: None,
        }
    }

    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RecordStatus {
    Running,
    Succeeded,
    Blocked,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: String,
    pub message: String,
}

/// One entry in a session's append-only `history`. Immutable once its
/// `status` leaves `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageExecutionRecord {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub status: RecordStatus,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub inputs: Value,
    pub outputs: Vec<Artifact>,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: String,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub script_id: harmony_core::ScriptId,
    pub current_index: usize,
    pub status: SessionStatus,
    pub created_at: String,
    pub updated_at: String,
    pub vars: CiMap<Value>,
    pub artifacts: CiMap<Artifact>,
    pub history: Vec<MessageExecutionRecord>,
    pub transcript: Vec<ChatEntry>,
    pub metadata: CiMap<String>,
    pub execution_id_index: CiMap<usize>,
}

impl Session {
    pub fn new(session_id: SessionId, script_id: harmony_core::ScriptId, now: impl Into<String>) -> Self {
        let now = now.into();
        Self {
            session_id,
            script_id,
            current_index: 0,
            status: SessionStatus::Created,
            created_at: now.clone(),
            updated_at: now,
            vars: CiMap::new(),
            artifacts: CiMap::new(),
            history: Vec::new(),
            transcript: Vec::new(),
            metadata: CiMap::new(),
            execution_id_index: CiMap::new(),
        }
    }
}
