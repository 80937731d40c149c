//! `ScriptStore`/`SessionStore`/`SessionIndexStore` implementations backed by
//! a shared sqlite connection (§4.8, §5, §6). Blocking rusqlite calls are
//! made directly inside the `async_trait` methods while the connection
//! mutex is held — the same trade-off the teacher's `SessionManager` makes
//! (no connection pool, no `spawn_blocking`), acceptable for the
//! single-node target these stores serve.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use harmony_core::{Envelope, ScriptId};
use harmony_session::{Result as SessionResult, Session, SessionError, SessionId};
use harmony_session::{ScriptStore, SessionIndexStore, SessionStore};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::db::init_db;
use crate::error::Result;

fn map_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::ServiceError(e.to_string())
}

/// Opens (and initializes) a sqlite database file, then hands out the three
/// store handles sharing its connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory sqlite database — useful for integration tests that want
    /// the real SQL code paths without a file on disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn script_store(&self) -> SqliteScriptStore {
        SqliteScriptStore { conn: Arc::clone(&self.conn) }
    }

    pub fn session_store(&self) -> SqliteSessionStore {
        SqliteSessionStore { conn: Arc::clone(&self.conn) }
    }

    pub fn index_store(&self) -> SqliteSessionIndexStore {
        SqliteSessionIndexStore { conn: Arc::clone(&self.conn) }
    }
}

pub struct SqliteScriptStore {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl ScriptStore for SqliteScriptStore {
    #[instrument(skip(self, envelope), fields(script_id = %script_id))]
    async fn register(&self, script_id: ScriptId, envelope: Envelope) -> SessionResult<()> {
        let envelope_json = serde_json::to_string(&envelope).map_err(map_err)?;
        let db = self.conn.lock().expect("sqlite connection poisoned");
        db.execute(
            "INSERT INTO scripts (script_id, format_version, envelope_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(script_id) DO UPDATE SET
                format_version = excluded.format_version,
                envelope_json  = excluded.envelope_json",
            rusqlite::params![script_id.to_string(), envelope.format_version, envelope_json],
        )
        .map_err(map_err)?;
        debug!("script registered");
        Ok(())
    }

    async fn get(&self, script_id: &ScriptId) -> SessionResult<Option<Envelope>> {
        let db = self.conn.lock().expect("sqlite connection poisoned");
        let row: Option<String> = db
            .query_row(
                "SELECT envelope_json FROM scripts WHERE script_id = ?1",
                rusqlite::params![script_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)?;
        row.map(|json| serde_json::from_str(&json).map_err(map_err))
            .transpose()
    }

    async fn delete(&self, script_id: &ScriptId) -> SessionResult<()> {
        let db = self.conn.lock().expect("sqlite connection poisoned");
        db.execute(
            "DELETE FROM scripts WHERE script_id = ?1",
            rusqlite::params![script_id.to_string()],
        )
        .map_err(map_err)?;
        Ok(())
    }
}

pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, id: &SessionId) -> SessionResult<Option<Session>> {
        let db = self.conn.lock().expect("sqlite connection poisoned");
        let row: Option<String> = db
            .query_row(
                "SELECT session_json FROM sessions WHERE session_id = ?1",
                rusqlite::params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)?;
        row.map(|json| serde_json::from_str(&json).map_err(map_err))
            .transpose()
    }

    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    async fn save(&self, session: &Session) -> SessionResult<()> {
        let session_json = serde_json::to_string(session).map_err(map_err)?;
        let db = self.conn.lock().expect("sqlite connection poisoned");
        db.execute(
            "INSERT INTO sessions (session_id, script_id, status, updated_at, session_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id) DO UPDATE SET
                script_id    = excluded.script_id,
                status       = excluded.status,
                updated_at   = excluded.updated_at,
                session_json = excluded.session_json",
            rusqlite::params![
                session.session_id.to_string(),
                session.script_id.to_string(),
                session.status.as_str(),
                session.updated_at,
                session_json,
            ],
        )
        .map_err(map_err)?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> SessionResult<()> {
        let db = self.conn.lock().expect("sqlite connection poisoned");
        db.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            rusqlite::params![id.to_string()],
        )
        .map_err(map_err)?;
        Ok(())
    }
}

pub struct SqliteSessionIndexStore {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl SessionIndexStore for SqliteSessionIndexStore {
    /// A no-op: the `sessions` table's own `(script_id, updated_at)` columns
    /// already carry everything `list` needs, kept current by
    /// `SqliteSessionStore::save`. Indexing here would just duplicate state
    /// that `save` already maintains transactionally — see DESIGN.md.
    async fn touch(&self, _session_id: &SessionId, _script_id: &ScriptId, _updated_at: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn remove(&self, _session_id: &SessionId) -> SessionResult<()> {
        Ok(())
    }

    async fn list(
        &self,
        script_id: Option<&ScriptId>,
        limit: usize,
        offset: usize,
    ) -> SessionResult<(Vec<SessionId>, usize)> {
        let db = self.conn.lock().expect("sqlite connection poisoned");

        let total: i64 = match script_id {
            Some(sid) => db
                .query_row(
                    "SELECT COUNT(*) FROM sessions WHERE script_id = ?1",
                    rusqlite::params![sid.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_err)?,
            None => db
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .map_err(map_err)?,
        };

        // Ordered by (updatedAt desc, sessionId asc) per §4.8.
        let mut stmt = match script_id {
            Some(_) => db
                .prepare(
                    "SELECT session_id FROM sessions WHERE script_id = ?1
                     ORDER BY updated_at DESC, session_id ASC
                     LIMIT ?2 OFFSET ?3",
                )
                .map_err(map_err)?,
            None => db
                .prepare(
                    "SELECT session_id FROM sessions
                     ORDER BY updated_at DESC, session_id ASC
                     LIMIT ?1 OFFSET ?2",
                )
                .map_err(map_err)?,
        };

        let ids: Vec<SessionId> = match script_id {
            Some(sid) => stmt
                .query_map(
                    rusqlite::params![sid.to_string(), limit as i64, offset as i64],
                    |row| row.get::<_, String>(0),
                )
                .map_err(map_err)?
                .filter_map(|r| r.ok())
                .map(SessionId)
                .collect(),
            None => stmt
                .query_map(rusqlite::params![limit as i64, offset as i64], |row| {
                    row.get::<_, String>(0)
                })
                .map_err(map_err)?
                .filter_map(|r| r.ok())
                .map(SessionId)
                .collect(),
        };

        Ok((ids, total as usize))
    }
}
