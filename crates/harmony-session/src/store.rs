//! Pluggable persistence contracts (§5, §6) plus in-memory reference
//! implementations. Durable implementations (e.g. sqlite) live in
//! `harmony-store-sqlite` and implement these same traits.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use harmony_core::{Envelope, ScriptId};

use crate::error::Result;
use crate::model::{Session, SessionId};

#[async_trait]
pub trait ScriptStore: Send + Sync {
    async fn register(&self, script_id: ScriptId, envelope: Envelope) -> Result<()>;
    async fn get(&self, script_id: &ScriptId) -> Result<Option<Envelope>>;
    async fn delete(&self, script_id: &ScriptId) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
    async fn delete(&self, id: &SessionId) -> Result<()>;
}

/// Backs `ListSessions` paging, ordered by `(updatedAt desc, sessionId asc)`
/// (§4.8). Kept separate from `SessionStore` so a durable backend can index
/// independently of how it stores the session row itself.
#[async_trait]
pub trait SessionIndexStore: Send + Sync {
    async fn touch(&self, session_id: &SessionId, script_id: &ScriptId, updated_at: &str) -> Result<()>;
    async fn remove(&self, session_id: &SessionId) -> Result<()>;
    /// Returns `(page, total_count)` for sessions matching `script_id` (or
    /// all sessions when `None`), `limit` entries starting at `offset`.
    async fn list(
        &self,
        script_id: Option<&ScriptId>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SessionId>, usize)>;
}

#[derive(Default)]
pub struct InMemoryScriptStore {
    envelopes: RwLock<HashMap<ScriptId, Envelope>>,
}

impl InMemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptStore for InMemoryScriptStore {
    async fn register(&self, script_id: ScriptId, envelope: Envelope) -> Result<()> {
        self.envelopes.write().expect("script store poisoned").insert(script_id, envelope);
        Ok(())
    }

    async fn get(&self, script_id: &ScriptId) -> Result<Option<Envelope>> {
        Ok(self.envelopes.read().expect("script store poisoned").get(script_id).cloned())
    }

    async fn delete(&self, script_id: &ScriptId) -> Result<()> {
        self.envelopes.write().expect("script store poisoned").remove(script_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.read().expect("session store poisoned").get(id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .expect("session store poisoned")
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.sessions.write().expect("session store poisoned").remove(id);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    session_id: SessionId,
    script_id: ScriptId,
    updated_at: String,
}

#[derive(Default)]
pub struct InMemorySessionIndexStore {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemorySessionIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionIndexStore for InMemorySessionIndexStore {
    async fn touch(&self, session_id: &SessionId, script_id: &ScriptId, updated_at: &str) -> Result<()> {
        let mut entries = self.entries.write().expect("session index poisoned");
        entries.retain(|e| &e.session_id != session_id);
        entries.push(IndexEntry {
            session_id: session_id.clone(),
            script_id: script_id.clone(),
            updated_at: updated_at.to_string(),
        });
        Ok(())
    }

    async fn remove(&self, session_id: &SessionId) -> Result<()> {
        self.entries.write().expect("session index poisoned").retain(|e| &e.session_id != session_id);
        Ok(())
    }

    async fn list(
        &self,
        script_id: Option<&ScriptId>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SessionId>, usize)> {
        let entries = self.entries.read().expect("session index poisoned");
        let mut matching: Vec<&IndexEntry> = entries
            .iter()
            .filter(|e| script_id.map(|sid| sid == &e.script_id).unwrap_or(true))
            .collect();
        matching.sort_by(|a, b| {
            b.updated_at.cmp(&a.updated_at).then_with(|| a.session_id.0.cmp(&b.session_id.0))
        });
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.session_id.clone())
            .collect();
        Ok((page, total))
    }
}

/// Parse the reference `offset:<n>` continuation token format (§4.8).
/// Unparseable tokens degrade to offset 0.
pub fn parse_continuation_token(token: Option<&str>) -> usize {
    match token {
        Some(t) => t.strip_prefix("offset:").and_then(|n| n.parse::<usize>().ok()).unwrap_or(0),
        None => 0,
    }
}

pub fn encode_continuation_token(offset: usize) -> String {
    format!("offset:{offset}")
}
