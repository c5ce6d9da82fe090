//! Persistent agent registry.

use crate::Db;
use chrono::{DateTime, Utc};
use uplift_types::agent::{AgentId, AgentManifest, AgentStatus};
use uplift_types::error::{UpliftError, UpliftResult};

/// A registered agent as stored in the database.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentEntry {
    pub id: AgentId,
    pub manifest: AgentManifest,
    pub status: AgentStatus,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub registered_at: DateTime<Utc>,
}

/// Agent registry backed by the `agents` table.
#[derive(Clone)]
pub struct AgentStore {
    conn: Db,
}

impl AgentStore {
    /// Create a new agent store wrapping the given connection.
    pub fn new(conn: Db) -> Self {
        Self { conn }
    }

    /// Register an agent, or update its manifest when the name exists.
    /// Registration resets the agent to `stopped` with a fresh restart count.
    pub fn register(&self, id: AgentId, manifest: &AgentManifest) -> UpliftResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let manifest_json = serde_json::to_string(manifest)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO agents (name, id, manifest, status, pid, restart_count, registered_at, updated_at)
             VALUES (?1, ?2, ?3, 'stopped', NULL, 0, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET manifest = ?3, status = 'stopped', pid = NULL,
                 restart_count = 0, updated_at = ?4",
            rusqlite::params![manifest.name, id.to_string(), manifest_json, now],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(())
    }

    /// Load one agent by name.
    pub fn get(&self, name: &str) -> UpliftResult<Option<AgentEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, manifest, status, pid, restart_count, registered_at
                 FROM agents WHERE name = ?1",
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let result = stmt.query_row(rusqlite::params![name], row_to_entry);
        match result {
            Ok(entry) => Ok(Some(entry?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UpliftError::Memory(e.to_string())),
        }
    }

    /// Load every registered agent, sorted by name.
    pub fn list(&self) -> UpliftResult<Vec<AgentEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, manifest, status, pid, restart_count, registered_at
                 FROM agents ORDER BY name",
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_entry)
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| UpliftError::Memory(e.to_string()))??);
        }
        Ok(entries)
    }

    /// Update status and pid for an agent.
    pub fn set_status(
        &self,
        name: &str,
        status: AgentStatus,
        pid: Option<u32>,
    ) -> UpliftResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let changed = conn
            .execute(
                "UPDATE agents SET status = ?2, pid = ?3, updated_at = ?4 WHERE name = ?1",
                rusqlite::params![
                    name,
                    status.as_str(),
                    pid,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        if changed == 0 {
            return Err(UpliftError::AgentNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Increment and return the restart count for an agent.
    pub fn bump_restart_count(&self, name: &str) -> UpliftResult<u32> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        conn.execute(
            "UPDATE agents SET restart_count = restart_count + 1, updated_at = ?2 WHERE name = ?1",
            rusqlite::params![name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let count: u32 = conn
            .query_row(
                "SELECT restart_count FROM agents WHERE name = ?1",
                rusqlite::params![name],
                |row| row.get(0),
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(count)
    }

    /// Remove an agent from the registry.
    pub fn remove(&self, name: &str) -> UpliftResult<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let changed = conn
            .execute("DELETE FROM agents WHERE name = ?1", rusqlite::params![name])
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(changed > 0)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<UpliftResult<AgentEntry>> {
    let id_str: String = row.get(0)?;
    let manifest_json: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let pid: Option<u32> = row.get(3)?;
    let restart_count: u32 = row.get(4)?;
    let registered_str: String = row.get(5)?;
    Ok(build_entry(
        id_str,
        manifest_json,
        status_str,
        pid,
        restart_count,
        registered_str,
    ))
}

fn build_entry(
    id_str: String,
    manifest_json: String,
    status_str: String,
    pid: Option<u32>,
    restart_count: u32,
    registered_str: String,
) -> UpliftResult<AgentEntry> {
    let id = uuid::Uuid::parse_str(&id_str)
        .map(AgentId)
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
    let manifest: AgentManifest = serde_json::from_str(&manifest_json)?;
    let status: AgentStatus = status_str.parse()?;
    let registered_at = DateTime::parse_from_rfc3339(&registered_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(AgentEntry {
        id,
        manifest,
        status,
        pid,
        restart_count,
        registered_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str) -> AgentManifest {
        AgentManifest::from_yaml(&format!(
            "name: {name}\nentrypoint:\n  command: python3\n  args: [\"agent.py\"]\n"
        ))
        .unwrap()
    }

    #[test]
    fn register_and_load() {
        let store = AgentStore::new(crate::open_in_memory().unwrap());
        let id = AgentId::new();
        store.register(id, &manifest("research-agent")).unwrap();

        let entry = store.get("research-agent").unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, AgentStatus::Stopped);
        assert_eq!(entry.restart_count, 0);

        assert!(store.get("absent").unwrap().is_none());
    }

    #[test]
    fn reregister_resets_runtime_state() {
        let store = AgentStore::new(crate::open_in_memory().unwrap());
        let id = AgentId::new();
        store.register(id, &manifest("a")).unwrap();
        store.set_status("a", AgentStatus::Running, Some(42)).unwrap();
        store.bump_restart_count("a").unwrap();

        store.register(id, &manifest("a")).unwrap();
        let entry = store.get("a").unwrap().unwrap();
        assert_eq!(entry.status, AgentStatus::Stopped);
        assert_eq!(entry.pid, None);
        assert_eq!(entry.restart_count, 0);
    }

    #[test]
    fn status_and_restart_accounting() {
        let store = AgentStore::new(crate::open_in_memory().unwrap());
        store.register(AgentId::new(), &manifest("a")).unwrap();

        store.set_status("a", AgentStatus::Running, Some(7)).unwrap();
        let entry = store.get("a").unwrap().unwrap();
        assert_eq!(entry.status, AgentStatus::Running);
        assert_eq!(entry.pid, Some(7));

        assert_eq!(store.bump_restart_count("a").unwrap(), 1);
        assert_eq!(store.bump_restart_count("a").unwrap(), 2);

        assert!(store
            .set_status("absent", AgentStatus::Running, None)
            .is_err());
    }

    #[test]
    fn list_sorted_and_remove() {
        let store = AgentStore::new(crate::open_in_memory().unwrap());
        store.register(AgentId::new(), &manifest("zeta")).unwrap();
        store.register(AgentId::new(), &manifest("alpha")).unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.manifest.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        assert!(store.remove("zeta").unwrap());
        assert!(!store.remove("zeta").unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
