//! Scope-keyed key-value memory.

use crate::Db;
use chrono::Utc;
use tracing::debug;
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::scope::ScopeUri;

/// A key-value pair returned by a memory query, tagged with its scope.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueryHit {
    pub scope: ScopeUri,
    pub key: String,
    pub value: serde_json::Value,
}

/// Key-value store over permissioned memory scopes.
///
/// Permission checks happen above this layer; the store trusts its callers
/// to pass only scopes the requesting agent may touch.
#[derive(Clone)]
pub struct MemoryStore {
    conn: Db,
}

impl MemoryStore {
    /// Create a new memory store wrapping the given connection.
    pub fn new(conn: Db) -> Self {
        Self { conn }
    }

    /// Get a value. Returns None when the key is absent.
    pub fn get(&self, scope: &ScopeUri, key: &str) -> UpliftResult<Option<serde_json::Value>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT value FROM kv_store WHERE scope = ?1 AND key = ?2")
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let result = stmt.query_row(rusqlite::params![scope.to_string(), key], |row| {
            let blob: Vec<u8> = row.get(0)?;
            Ok(blob)
        });
        match result {
            Ok(blob) => {
                let value: serde_json::Value = serde_json::from_slice(&blob)
                    .map_err(|e| UpliftError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UpliftError::Memory(e.to_string())),
        }
    }

    /// Store a value. Returns the new version of the key (1 on first write).
    pub fn set(&self, scope: &ScopeUri, key: &str, value: &serde_json::Value) -> UpliftResult<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let blob =
            serde_json::to_vec(value).map_err(|e| UpliftError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO kv_store (scope, key, value, version, updated_at) VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(scope, key) DO UPDATE SET value = ?3, version = version + 1, updated_at = ?4",
            rusqlite::params![scope.to_string(), key, blob, now],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let version: u64 = conn
            .query_row(
                "SELECT version FROM kv_store WHERE scope = ?1 AND key = ?2",
                rusqlite::params![scope.to_string(), key],
                |row| row.get(0),
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        debug!(scope = %scope, key, version, "Stored value");
        Ok(version)
    }

    /// Delete a key. Returns true when the key existed.
    pub fn delete(&self, scope: &ScopeUri, key: &str) -> UpliftResult<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let changed = conn
            .execute(
                "DELETE FROM kv_store WHERE scope = ?1 AND key = ?2",
                rusqlite::params![scope.to_string(), key],
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        debug!(scope = %scope, key, deleted = changed > 0, "Deleted key");
        Ok(changed > 0)
    }

    /// List all keys in a scope, sorted.
    pub fn list(&self, scope: &ScopeUri) -> UpliftResult<Vec<(String, serde_json::Value)>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM kv_store WHERE scope = ?1 ORDER BY key")
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![scope.to_string()], |row| {
                let key: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((key, blob))
            })
            .map_err(|e| UpliftError::Memory(e.to_string()))?;

        let mut pairs = Vec::new();
        for row in rows {
            let (key, blob) = row.map_err(|e| UpliftError::Memory(e.to_string()))?;
            let value: serde_json::Value = serde_json::from_slice(&blob)
                .map_err(|e| UpliftError::Serialization(e.to_string()))?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    /// Case-insensitive substring search over keys and values across the
    /// given scopes. Results are newest-first, capped at `limit`.
    pub fn query(
        &self,
        text: &str,
        scopes: &[ScopeUri],
        limit: usize,
    ) -> UpliftResult<Vec<QueryHit>> {
        if scopes.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;

        // LIKE wildcards in the needle are literal search characters.
        let escaped = text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{escaped}%");

        let placeholders: Vec<String> = (0..scopes.len()).map(|i| format!("?{}", i + 3)).collect();
        let sql = format!(
            "SELECT scope, key, value FROM kv_store
             WHERE (key LIKE ?1 ESCAPE '\\' OR CAST(value AS TEXT) LIKE ?1 ESCAPE '\\')
               AND scope IN ({})
             ORDER BY updated_at DESC LIMIT ?2",
            placeholders.join(", ")
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| UpliftError::Memory(e.to_string()))?;

        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(pattern), Box::new(limit as i64)];
        for scope in scopes {
            params.push(Box::new(scope.to_string()));
        }
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let scope: String = row.get(0)?;
                let key: String = row.get(1)?;
                let blob: Vec<u8> = row.get(2)?;
                Ok((scope, key, blob))
            })
            .map_err(|e| UpliftError::Memory(e.to_string()))?;

        let mut hits = Vec::new();
        for row in rows {
            let (scope, key, blob) = row.map_err(|e| UpliftError::Memory(e.to_string()))?;
            let scope: ScopeUri = scope.parse()?;
            let value: serde_json::Value = serde_json::from_slice(&blob)
                .map_err(|e| UpliftError::Serialization(e.to_string()))?;
            hits.push(QueryHit { scope, key, value });
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new(crate::open_in_memory().unwrap())
    }

    fn scope(s: &str) -> ScopeUri {
        s.parse().unwrap()
    }

    #[test]
    fn set_get_delete() {
        let store = store();
        let s = scope("uplift://agent/writer-agent");

        assert_eq!(store.get(&s, "draft").unwrap(), None);

        let v1 = store.set(&s, "draft", &json!({"title": "Q3 report"})).unwrap();
        assert_eq!(v1, 1);
        let v2 = store.set(&s, "draft", &json!({"title": "Q3 report, rev 2"})).unwrap();
        assert_eq!(v2, 2);

        let value = store.get(&s, "draft").unwrap().unwrap();
        assert_eq!(value["title"], "Q3 report, rev 2");

        assert!(store.delete(&s, "draft").unwrap());
        assert!(!store.delete(&s, "draft").unwrap());
        assert_eq!(store.get(&s, "draft").unwrap(), None);
    }

    #[test]
    fn scopes_are_isolated() {
        let store = store();
        let a = scope("uplift://agent/a");
        let b = scope("uplift://agent/b");
        store.set(&a, "k", &json!(1)).unwrap();
        assert_eq!(store.get(&b, "k").unwrap(), None);
        assert_eq!(store.list(&a).unwrap().len(), 1);
        assert!(store.list(&b).unwrap().is_empty());
    }

    #[test]
    fn query_matches_keys_and_values() {
        let store = store();
        let shared = scope("uplift://shared/research");
        let private = scope("uplift://agent/other");
        store
            .set(&shared, "sources-q3", &json!(["url-one", "url-two"]))
            .unwrap();
        store
            .set(&shared, "summary", &json!("quarterly budget findings"))
            .unwrap();
        store.set(&private, "budget", &json!("hidden")).unwrap();

        // Key match
        let hits = store.query("sources", &[shared.clone()], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "sources-q3");

        // Value match, case-insensitive
        let hits = store.query("BUDGET", &[shared.clone()], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "summary");

        // Only the given scopes are searched
        let hits = store.query("budget", &[shared], 10).unwrap();
        assert!(hits.iter().all(|h| h.key != "budget"));
    }

    #[test]
    fn query_escapes_like_wildcards() {
        let store = store();
        let s = scope("uplift://shared/x");
        store.set(&s, "plain", &json!("100% done")).unwrap();
        store.set(&s, "other", &json!("unrelated")).unwrap();

        let hits = store.query("100%", &[s], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "plain");
    }

    #[test]
    fn query_without_scopes_is_empty() {
        let store = store();
        assert!(store.query("anything", &[], 10).unwrap().is_empty());
    }
}
