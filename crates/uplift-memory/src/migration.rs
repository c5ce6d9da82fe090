//! SQLite schema creation and migration.
//!
//! Creates all tables used by the runtime on first boot. Versioning uses
//! `PRAGMA user_version`, with a human-readable mirror in the `migrations`
//! table.

use rusqlite::Connection;

/// Current schema version.
const SCHEMA_VERSION: u32 = 2;

/// Run all migrations to bring the database up to date.
pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Get the current schema version from the database.
fn get_schema_version(conn: &Connection) -> u32 {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0)
}

/// Check if a column exists in a table (SQLite has no ADD COLUMN IF NOT EXISTS).
fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let sql = format!("PRAGMA table_info({})", table);
    let Ok(mut stmt) = conn.prepare(&sql) else {
        return false;
    };
    let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(1)) else {
        return false;
    };
    let names: Vec<String> = rows.filter_map(|r| r.ok()).collect();
    names.iter().any(|n| n == column)
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "user_version", version)
}

/// Version 1: Create all core tables.
fn migrate_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        -- Agent registry
        CREATE TABLE IF NOT EXISTS agents (
            name TEXT PRIMARY KEY,
            id TEXT NOT NULL,
            manifest TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'stopped',
            pid INTEGER,
            restart_count INTEGER NOT NULL DEFAULT 0,
            registered_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Scope-keyed key-value memory
        CREATE TABLE IF NOT EXISTS kv_store (
            scope TEXT NOT NULL,
            key TEXT NOT NULL,
            value BLOB NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (scope, key)
        );
        CREATE INDEX IF NOT EXISTS idx_kv_scope ON kv_store(scope);

        -- Delegated task queue
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            source_agent TEXT NOT NULL,
            target_agent TEXT NOT NULL,
            objective TEXT NOT NULL,
            input_data TEXT NOT NULL DEFAULT 'null',
            shared_scopes TEXT NOT NULL DEFAULT '[]',
            priority TEXT NOT NULL DEFAULT 'normal',
            priority_rank INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            output_memory_key TEXT,
            error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_claim
            ON tasks(target_agent, status, priority_rank DESC, created_at);
        CREATE INDEX IF NOT EXISTS idx_tasks_source ON tasks(source_agent);

        -- Approval queue
        CREATE TABLE IF NOT EXISTS approvals (
            id TEXT PRIMARY KEY,
            agent TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            risk_level TEXT NOT NULL DEFAULT 'medium',
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            timeout_at TEXT NOT NULL,
            decided_by TEXT,
            decided_at TEXT,
            denial_reason TEXT,
            comment TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals(status);
        CREATE INDEX IF NOT EXISTS idx_approvals_agent ON approvals(agent);

        -- Approval audit trail
        CREATE TABLE IF NOT EXISTS approval_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            details TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_approval_audit_request
            ON approval_audit(request_id);

        -- Event log
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            payload TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);

        -- Migration tracking
        CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT
        );

        INSERT OR IGNORE INTO migrations (version, applied_at, description)
        VALUES (1, datetime('now'), 'Initial schema');
        ",
    )?;
    Ok(())
}

/// Version 2: Add category column to approvals for filtering in the CLI.
fn migrate_v2(conn: &Connection) -> Result<(), rusqlite::Error> {
    if !column_exists(conn, "approvals", "category") {
        conn.execute("ALTER TABLE approvals ADD COLUMN category TEXT", [])?;
    }
    conn.execute(
        "INSERT OR IGNORE INTO migrations (version, applied_at, description) VALUES (2, datetime('now'), 'Add category column to approvals')",
        [],
    )?;
    Ok(())
}
