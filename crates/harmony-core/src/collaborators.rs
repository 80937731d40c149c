//! External collaborator contracts (§6): the language-model chat backend,
//! the tool-execution backend, and tool availability — all out of scope for
//! this crate's own implementation, specified only by the traits the engine
//! consumes. Grounded in the teacher's `async_trait` `LlmProvider`/`Tool`
//! collaborator idiom.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One entry of chat history passed to [`ChatService::get_assistant_reply`].
#[derive(Debug, Clone)]
pub struct ChatHistoryEntry {
    pub role: String,
    pub content: String,
    pub channel: Option<String>,
    pub content_type: Option<String>,
    pub recipient: Option<String>,
    pub termination: Option<String>,
    pub source_index: Option<usize>,
}

/// Default filter: drop entries whose channel is `analysis` or whose
/// content is empty (§6).
pub fn default_chat_filter(entry: &ChatHistoryEntry) -> bool {
    entry.channel.as_deref() != Some("analysis") && !entry.content.is_empty()
}

#[derive(Debug, Error)]
#[error("chat backend error: {0}")]
pub struct ChatError(pub String);

/// The language-model chat backend. Out of scope for this engine's own
/// implementation — specified only by this contract.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn get_assistant_reply(&self, history: &[ChatHistoryEntry]) -> Result<String, ChatError>;
}

#[derive(Debug, Error)]
#[error("tool invocation failed: {0}")]
pub struct ToolError(pub String);

/// The tool-execution backend.
#[async_trait]
pub trait ToolService: Send + Sync {
    async fn invoke(&self, recipient: &str, args: &Value) -> Result<Value, ToolError>;
}

/// Dependency-availability oracle consumed by the preflight analyzer (C6).
#[async_trait]
pub trait ToolAvailability: Send + Sync {
    async fn is_available(&self, recipient: &str) -> bool;
    async fn list_available(&self) -> HashSet<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_drops_analysis_and_empty() {
        let analysis = ChatHistoryEntry {
            role: "assistant".into(),
            content: "thinking".into(),
            channel: Some("analysis".into()),
            content_type: None,
            recipient: None,
            termination: None,
            source_index: None,
        };
        let empty = ChatHistoryEntry {
            role: "user".into(),
            content: "".into(),
            channel: None,
            content_type: None,
            recipient: None,
            termination: None,
            source_index: None,
        };
        let normal = ChatHistoryEntry {
            role: "user".into(),
            content: "hi".into(),
            channel: None,
            content_type: None,
            recipient: None,
            termination: None,
            source_index: None,
        };
        assert!(!default_chat_filter(&analysis));
        assert!(!default_chat_filter(&empty));
        assert!(default_chat_filter(&normal));
    }
}
