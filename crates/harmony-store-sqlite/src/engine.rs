//! Config-driven composition (§6 supplement): reads [`EngineConfig`] and
//! hands back an [`Engine`] wired to either the durable sqlite stores or the
//! in-memory reference stores, mirroring the teacher's `AppState::new`
//! taking a `SkynetConfig` and constructing the managers it names.

use std::sync::Arc;

use harmony_core::{ChatService, EngineConfig, ToolAvailability, ToolService};
use harmony_session::{Engine, LockProvider};

use crate::error::Result;
use crate::store::SqliteStore;

/// Builds an [`Engine`] per `config.store.durable`: sqlite-backed stores at
/// `config.store.sqlite_path` when true, in-memory stores otherwise.
pub fn build_engine(
    config: &EngineConfig,
    availability: Arc<dyn ToolAvailability>,
    tools: Arc<dyn ToolService>,
    chat: Arc<dyn ChatService>,
) -> Result<Engine> {
    if !config.store.durable {
        return Ok(Engine::in_memory(availability, tools, chat));
    }

    let store = SqliteStore::open(&config.store.sqlite_path)?;
    Ok(Engine::new(
        Arc::new(store.script_store()),
        Arc::new(store.session_store()),
        Arc::new(store.index_store()),
        Arc::new(LockProvider::new()),
        availability,
        tools,
        chat,
    ))
}
