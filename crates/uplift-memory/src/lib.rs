//! SQLite-backed memory substrate for the UPLIFT runtime.
//!
//! All persistent state lives in one database: scope-keyed agent memory,
//! the agent registry, the delegated-task queue, the approval queue, and
//! the event log.
//! Stores share a single `Arc<Mutex<Connection>>`; every operation takes
//! the lock, runs one statement (or a short transaction), and releases it.

pub mod agents;
pub mod approvals;
pub mod events;
pub mod migration;
pub mod store;
pub mod tasks;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uplift_types::error::{UpliftError, UpliftResult};

/// A shared database handle.
pub type Db = Arc<Mutex<Connection>>;

/// Open (or create) the database at `path` and bring the schema up to date.
pub fn open_database(path: &Path) -> UpliftResult<Db> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(|e| UpliftError::Memory(e.to_string()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
    migration::run_migrations(&conn).map_err(|e| UpliftError::Memory(e.to_string()))?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Open an in-memory database with the full schema. Test helper.
pub fn open_in_memory() -> UpliftResult<Db> {
    let conn = Connection::open_in_memory().map_err(|e| UpliftError::Memory(e.to_string()))?;
    migration::run_migrations(&conn).map_err(|e| UpliftError::Memory(e.to_string()))?;
    Ok(Arc::new(Mutex::new(conn)))
}
