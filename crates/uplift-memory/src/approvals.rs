//! Approval queue persistence, with an audit trail for every transition.

use crate::Db;
use chrono::{DateTime, Utc};
use uplift_types::approval::{ApprovalAuditEntry, ApprovalRequest, ApprovalStatus, RiskLevel};
use uplift_types::error::{UpliftError, UpliftResult};

/// Approval queue backed by the `approvals` and `approval_audit` tables.
#[derive(Clone)]
pub struct ApprovalStore {
    conn: Db,
}

impl ApprovalStore {
    /// Create a new approval store wrapping the given connection.
    pub fn new(conn: Db) -> Self {
        Self { conn }
    }

    /// Persist a new request and its `created` audit row.
    pub fn insert(&self, request: &ApprovalRequest) -> UpliftResult<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let details = serde_json::to_string(&request.details)?;
        tx.execute(
            "INSERT INTO approvals (id, agent, action, details, risk_level, category,
                 status, created_at, timeout_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                request.id,
                request.agent,
                request.action,
                details,
                request.risk_level.as_str(),
                request.category,
                request.status.as_str(),
                request.created_at.to_rfc3339(),
                request.timeout_at.to_rfc3339(),
            ],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        tx.execute(
            "INSERT INTO approval_audit (request_id, timestamp, action, actor, details)
             VALUES (?1, ?2, 'created', ?3, ?4)",
            rusqlite::params![
                request.id,
                Utc::now().to_rfc3339(),
                request.agent,
                request.action,
            ],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        tx.commit().map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(())
    }

    /// Load one request by id.
    pub fn get(&self, id: &str) -> UpliftResult<Option<ApprovalRequest>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_APPROVAL} WHERE id = ?1"))
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let result = stmt.query_row(rusqlite::params![id], row_to_request);
        match result {
            Ok(req) => Ok(Some(req?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UpliftError::Memory(e.to_string())),
        }
    }

    /// All pending requests, newest first.
    pub fn pending(&self) -> UpliftResult<Vec<ApprovalRequest>> {
        self.select_many(
            &format!("{SELECT_APPROVAL} WHERE status = 'pending' ORDER BY created_at DESC"),
            rusqlite::params![],
        )
    }

    /// Recent requests in any state, newest first.
    pub fn recent(&self, limit: usize) -> UpliftResult<Vec<ApprovalRequest>> {
        self.select_many(
            &format!("{SELECT_APPROVAL} ORDER BY created_at DESC LIMIT ?1"),
            rusqlite::params![limit as i64],
        )
    }

    /// Record a decision. The update is conditional on the request still
    /// being pending, which makes decisions single-shot.
    pub fn decide(
        &self,
        id: &str,
        status: ApprovalStatus,
        actor: &str,
        reason: Option<&str>,
        comment: Option<&str>,
    ) -> UpliftResult<()> {
        if !status.is_decided() {
            return Err(UpliftError::InvalidInput(
                "decision status must not be 'pending'".to_string(),
            ));
        }
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let changed = tx
            .execute(
                "UPDATE approvals SET status = ?2, decided_by = ?3, decided_at = ?4,
                     denial_reason = ?5, comment = ?6
                 WHERE id = ?1 AND status = 'pending'",
                rusqlite::params![id, status.as_str(), actor, now, reason, comment],
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        if changed == 0 {
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM approvals WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .ok();
            return match current {
                Some(current) => Err(UpliftError::InvalidState {
                    current,
                    operation: status.as_str().to_string(),
                }),
                None => Err(UpliftError::ApprovalNotFound(id.to_string())),
            };
        }
        tx.execute(
            "INSERT INTO approval_audit (request_id, timestamp, action, actor, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, now, status.as_str(), actor, reason.or(comment)],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        tx.commit().map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(())
    }

    /// Expire every pending request whose `timeout_at` has passed.
    /// Returns the ids that were expired.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> UpliftResult<Vec<String>> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let now_str = now.to_rfc3339();

        let ids: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT id FROM approvals WHERE status = 'pending' AND timeout_at <= ?1")
                .map_err(|e| UpliftError::Memory(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![now_str], |row| row.get(0))
                .map_err(|e| UpliftError::Memory(e.to_string()))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.map_err(|e| UpliftError::Memory(e.to_string()))?);
            }
            ids
        };

        for id in &ids {
            tx.execute(
                "UPDATE approvals SET status = 'expired', decided_at = ?2 WHERE id = ?1",
                rusqlite::params![id, now_str],
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
            tx.execute(
                "INSERT INTO approval_audit (request_id, timestamp, action, actor, details)
                 VALUES (?1, ?2, 'expired', 'system', 'decision timeout elapsed')",
                rusqlite::params![id, now_str],
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        }
        tx.commit().map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(ids)
    }

    /// Audit trail for one request, oldest first.
    pub fn audit_trail(&self, request_id: &str) -> UpliftResult<Vec<ApprovalAuditEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT request_id, timestamp, action, actor, details
                 FROM approval_audit WHERE request_id = ?1 ORDER BY id",
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![request_id], |row| {
                let ts: String = row.get(1)?;
                Ok(ApprovalAuditEntry {
                    request_id: row.get(0)?,
                    timestamp: parse_ts(&ts),
                    action: row.get(2)?,
                    actor: row.get(3)?,
                    details: row.get(4)?,
                })
            })
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| UpliftError::Memory(e.to_string()))?);
        }
        Ok(entries)
    }

    fn select_many(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::types::ToSql],
    ) -> UpliftResult<Vec<ApprovalRequest>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let rows = stmt
            .query_map(params, row_to_request)
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(row.map_err(|e| UpliftError::Memory(e.to_string()))??);
        }
        Ok(requests)
    }
}

const SELECT_APPROVAL: &str = "SELECT id, agent, action, details, risk_level, category,
    status, created_at, timeout_at, decided_by, decided_at, denial_reason, comment
    FROM approvals";

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<UpliftResult<ApprovalRequest>> {
    let id: String = row.get(0)?;
    let agent: String = row.get(1)?;
    let action: String = row.get(2)?;
    let details_str: String = row.get(3)?;
    let risk_str: String = row.get(4)?;
    let category: Option<String> = row.get(5)?;
    let status_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;
    let timeout_str: String = row.get(8)?;
    let decided_by: Option<String> = row.get(9)?;
    let decided_str: Option<String> = row.get(10)?;
    let denial_reason: Option<String> = row.get(11)?;
    let comment: Option<String> = row.get(12)?;

    Ok((|| {
        let details: serde_json::Value = serde_json::from_str(&details_str)?;
        let risk_level = RiskLevel::parse(&risk_str)
            .ok_or_else(|| UpliftError::Memory(format!("bad risk level '{risk_str}'")))?;
        let status = ApprovalStatus::parse(&status_str)
            .ok_or_else(|| UpliftError::Memory(format!("bad approval status '{status_str}'")))?;
        Ok(ApprovalRequest {
            id,
            agent,
            action,
            details,
            risk_level,
            category,
            status,
            created_at: parse_ts(&created_str),
            timeout_at: parse_ts(&timeout_str),
            decided_by,
            decided_at: decided_str.as_deref().map(parse_ts),
            denial_reason,
            comment,
        })
    })())
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(id: &str, timeout_at: DateTime<Utc>) -> ApprovalRequest {
        ApprovalRequest {
            id: id.to_string(),
            agent: "invoice-manager".to_string(),
            action: "send_payment".to_string(),
            details: json!({"amount": 1250.0, "currency": "USD"}),
            risk_level: RiskLevel::High,
            category: Some("finance".to_string()),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            timeout_at,
            decided_by: None,
            decided_at: None,
            denial_reason: None,
            comment: None,
        }
    }

    #[test]
    fn insert_get_and_audit() {
        let store = ApprovalStore::new(crate::open_in_memory().unwrap());
        let req = request("AR-1-aaaa", Utc::now() + chrono::Duration::minutes(30));
        store.insert(&req).unwrap();

        let loaded = store.get("AR-1-aaaa").unwrap().unwrap();
        assert_eq!(loaded.action, "send_payment");
        assert_eq!(loaded.risk_level, RiskLevel::High);
        assert_eq!(loaded.details["amount"], 1250.0);

        let trail = store.audit_trail("AR-1-aaaa").unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "created");
        assert_eq!(trail[0].actor, "invoice-manager");
    }

    #[test]
    fn decisions_are_single_shot() {
        let store = ApprovalStore::new(crate::open_in_memory().unwrap());
        let req = request("AR-2-bbbb", Utc::now() + chrono::Duration::minutes(30));
        store.insert(&req).unwrap();

        store
            .decide("AR-2-bbbb", ApprovalStatus::Approved, "ops", None, Some("ok"))
            .unwrap();
        let loaded = store.get("AR-2-bbbb").unwrap().unwrap();
        assert_eq!(loaded.status, ApprovalStatus::Approved);
        assert_eq!(loaded.decided_by.as_deref(), Some("ops"));
        assert_eq!(loaded.comment.as_deref(), Some("ok"));

        // Second decision fails with the current state
        let err = store
            .decide("AR-2-bbbb", ApprovalStatus::Denied, "ops", Some("no"), None)
            .unwrap_err();
        assert!(matches!(err, UpliftError::InvalidState { ref current, .. } if current == "approved"));

        // Unknown id
        assert!(matches!(
            store.decide("AR-0-none", ApprovalStatus::Denied, "ops", None, None),
            Err(UpliftError::ApprovalNotFound(_))
        ));
    }

    #[test]
    fn expire_overdue_only_touches_late_pending() {
        let store = ApprovalStore::new(crate::open_in_memory().unwrap());
        let now = Utc::now();
        store
            .insert(&request("AR-3-late", now - chrono::Duration::seconds(1)))
            .unwrap();
        store
            .insert(&request("AR-4-fresh", now + chrono::Duration::minutes(30)))
            .unwrap();
        store
            .insert(&request("AR-5-done", now - chrono::Duration::seconds(1)))
            .unwrap();
        store
            .decide("AR-5-done", ApprovalStatus::Denied, "ops", Some("no"), None)
            .unwrap();

        let expired = store.expire_overdue(now).unwrap();
        assert_eq!(expired, vec!["AR-3-late".to_string()]);
        assert_eq!(
            store.get("AR-3-late").unwrap().unwrap().status,
            ApprovalStatus::Expired
        );
        assert_eq!(
            store.get("AR-4-fresh").unwrap().unwrap().status,
            ApprovalStatus::Pending
        );
        assert_eq!(
            store.get("AR-5-done").unwrap().unwrap().status,
            ApprovalStatus::Denied
        );

        let trail = store.audit_trail("AR-3-late").unwrap();
        assert_eq!(trail.last().unwrap().action, "expired");
    }

    #[test]
    fn pending_and_recent_listing() {
        let store = ApprovalStore::new(crate::open_in_memory().unwrap());
        let later = Utc::now() + chrono::Duration::minutes(30);
        for i in 0..3 {
            store.insert(&request(&format!("AR-l-{i}"), later)).unwrap();
        }
        store
            .decide("AR-l-0", ApprovalStatus::Approved, "ops", None, None)
            .unwrap();

        assert_eq!(store.pending().unwrap().len(), 2);
        assert_eq!(store.recent(10).unwrap().len(), 3);
        assert_eq!(store.recent(1).unwrap().len(), 1);
    }
}
