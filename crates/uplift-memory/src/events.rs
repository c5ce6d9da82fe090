//! Persistent event log.
//!
//! The event bus delivers in-memory; this store keeps the durable copy so
//! events survive a daemon restart and can be inspected after the fact.

use crate::Db;
use chrono::{DateTime, Utc};
use uplift_types::agent::AgentId;
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::event::{Event, EventId};

/// Event log backed by the `events` table.
#[derive(Clone)]
pub struct EventStore {
    conn: Db,
}

impl EventStore {
    /// Create a new event store wrapping the given connection.
    pub fn new(conn: Db) -> Self {
        Self { conn }
    }

    /// Persist one published event.
    pub fn insert(&self, event: &Event) -> UpliftResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let target = serde_json::to_string(&event.target)?;
        let payload = serde_json::to_string(&event.payload)?;
        conn.execute(
            "INSERT INTO events (id, source, target, payload, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                event.id.to_string(),
                event.source.to_string(),
                target,
                payload,
                event.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(())
    }

    /// The most recent events, newest first.
    pub fn recent(&self, limit: usize) -> UpliftResult<Vec<Event>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, source, target, payload, timestamp
                 FROM events ORDER BY timestamp DESC LIMIT ?1",
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                let id: String = row.get(0)?;
                let source: String = row.get(1)?;
                let target: String = row.get(2)?;
                let payload: String = row.get(3)?;
                let timestamp: String = row.get(4)?;
                Ok((id, source, target, payload, timestamp))
            })
            .map_err(|e| UpliftError::Memory(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            let (id, source, target, payload, timestamp) =
                row.map_err(|e| UpliftError::Memory(e.to_string()))?;
            events.push(Event {
                id: uuid::Uuid::parse_str(&id)
                    .map(EventId)
                    .map_err(|e| UpliftError::Memory(e.to_string()))?,
                source: uuid::Uuid::parse_str(&source)
                    .map(AgentId)
                    .map_err(|e| UpliftError::Memory(e.to_string()))?,
                target: serde_json::from_str(&target)?,
                payload: serde_json::from_str(&payload)?,
                timestamp: parse_ts(&timestamp),
            });
        }
        Ok(events)
    }

    /// Number of events on record.
    pub fn count(&self) -> UpliftResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let n: i64 = conn
            .query_row("SELECT count(*) FROM events", [], |row| row.get(0))
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(n as usize)
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
