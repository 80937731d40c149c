use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scripts/sessions schema in `conn`. Safe to call on every
/// startup — uses `IF NOT EXISTS` throughout, matching the teacher's
/// `skynet-sessions::db::init_db` / `skynet-scheduler::db::init_db` idiom.
///
/// Both tables store the domain object as a JSON blob (`envelope_json`,
/// `session_json`) alongside the columns the engine actually queries on —
/// the same shape as `skynet-scheduler`'s `action` opaque-JSON column.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS scripts (
            script_id      TEXT PRIMARY KEY,
            format_version INTEGER NOT NULL,
            envelope_json  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            session_id   TEXT PRIMARY KEY,
            script_id    TEXT NOT NULL,
            status       TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            session_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_script_updated
            ON sessions(script_id, updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_sessions_updated
            ON sessions(updated_at DESC);",
    )?;
    Ok(())
}
