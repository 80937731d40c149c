//! Durable store (A4): a `rusqlite`-backed implementation of `ScriptStore` /
//! `SessionStore` / `SessionIndexStore`, supplementing the in-memory
//! reference store §6 mandates. Grounded in the teacher's
//! `skynet-sessions::manager::SessionManager` (`Mutex<Connection>`,
//! upsert-then-read-back) and `skynet-scheduler::db` (schema init via
//! `IF NOT EXISTS`).
//!
//! A single sqlite connection is shared (behind one `Mutex`) across the
//! three store traits so `register_script`/`start_session`/`execute_*` see
//! one consistent file, the same way `AppState` in the teacher wires one
//! `SessionManager` connection through multiple call sites.

pub mod db;
pub mod engine;
pub mod error;
pub mod store;

pub use engine::build_engine;
pub use error::{Result, StoreError};
pub use store::{SqliteScriptStore, SqliteSessionIndexStore, SqliteSessionStore, SqliteStore};
