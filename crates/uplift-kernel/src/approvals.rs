//! The approval queue: request, decide, wait, and expire.

use crate::audit::{AuditAction, AuditLog};
use crate::event_bus::EventBus;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uplift_memory::approvals::ApprovalStore;
use uplift_types::agent::AgentId;
use uplift_types::approval::{ApprovalRequest, ApprovalStatus, RiskLevel};
use uplift_types::config::ApprovalConfig;
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::event::{ApprovalEvent, Event, EventPayload, EventTarget};

/// How often a waiting agent re-checks for a decision.
const WAIT_POLL_INTERVAL_MS: u64 = 500;

/// Build a request id of the form `AR-<millis>-<hash8>`.
///
/// The hash tail is the first 8 hex characters of SHA-256 over
/// `<agent>:<action>:<millis>`, which keeps ids distinct when two
/// requests land in the same millisecond.
fn make_request_id(agent: &str, action: &str, at: DateTime<Utc>) -> String {
    let millis = at.timestamp_millis();
    let mut hasher = Sha256::new();
    hasher.update(format!("{agent}:{action}:{millis}").as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("AR-{millis}-{}", &digest[..8])
}

/// The human-in-the-loop approval queue.
pub struct ApprovalQueue {
    store: ApprovalStore,
    config: ApprovalConfig,
    bus: Arc<EventBus>,
    audit: Arc<AuditLog>,
}

impl ApprovalQueue {
    pub fn new(
        store: ApprovalStore,
        config: ApprovalConfig,
        bus: Arc<EventBus>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            config,
            bus,
            audit,
        }
    }

    /// Submit a new request. The timeout defaults by risk level and may be
    /// shortened (never extended) by `timeout_secs`.
    pub async fn request(
        &self,
        agent: &str,
        action: &str,
        details: serde_json::Value,
        risk_level: RiskLevel,
        category: Option<String>,
        timeout_secs: Option<u64>,
    ) -> UpliftResult<ApprovalRequest> {
        let now = Utc::now();
        let configured = self.config.timeout_secs(risk_level);
        let timeout = timeout_secs.map_or(configured, |t| t.min(configured));
        let request = ApprovalRequest {
            id: make_request_id(agent, action, now),
            agent: agent.to_string(),
            action: action.to_string(),
            details,
            risk_level,
            category,
            status: ApprovalStatus::Pending,
            created_at: now,
            timeout_at: now + Duration::seconds(timeout as i64),
            decided_by: None,
            decided_at: None,
            denial_reason: None,
            comment: None,
        };
        self.store.insert(&request)?;

        info!(
            request_id = %request.id,
            agent,
            action,
            risk = %risk_level,
            "Approval requested"
        );
        self.audit.record(
            agent,
            AuditAction::ApprovalRequest,
            format!("{} ({})", request.id, action),
            "pending",
        );
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::Approval(ApprovalEvent::Requested {
                    request_id: request.id.clone(),
                    agent: agent.to_string(),
                    action: action.to_string(),
                }),
            ))
            .await;
        Ok(request)
    }

    /// Look up a request.
    pub fn get(&self, id: &str) -> UpliftResult<ApprovalRequest> {
        self.store
            .get(id)?
            .ok_or_else(|| UpliftError::ApprovalNotFound(id.to_string()))
    }

    /// All pending requests, newest first.
    pub fn pending(&self) -> UpliftResult<Vec<ApprovalRequest>> {
        self.store.pending()
    }

    /// Recent requests in any state.
    pub fn recent(&self, limit: usize) -> UpliftResult<Vec<ApprovalRequest>> {
        self.store.recent(limit)
    }

    /// Approve a pending request.
    pub async fn approve(
        &self,
        id: &str,
        approver: &str,
        comment: Option<String>,
    ) -> UpliftResult<ApprovalRequest> {
        self.decide(id, ApprovalStatus::Approved, approver, None, comment)
            .await
    }

    /// Deny a pending request.
    pub async fn deny(
        &self,
        id: &str,
        approver: &str,
        reason: Option<String>,
    ) -> UpliftResult<ApprovalRequest> {
        self.decide(id, ApprovalStatus::Denied, approver, reason, None)
            .await
    }

    /// Withdraw a pending request (the requesting agent changed its mind).
    pub async fn cancel(&self, id: &str, agent: &str) -> UpliftResult<ApprovalRequest> {
        self.decide(id, ApprovalStatus::Cancelled, agent, None, None)
            .await
    }

    async fn decide(
        &self,
        id: &str,
        status: ApprovalStatus,
        actor: &str,
        reason: Option<String>,
        comment: Option<String>,
    ) -> UpliftResult<ApprovalRequest> {
        self.store
            .decide(id, status, actor, reason.as_deref(), comment.as_deref())?;
        self.audit.record(
            actor,
            AuditAction::ApprovalDecision,
            id.to_string(),
            status.as_str(),
        );
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::Approval(ApprovalEvent::Decided {
                    request_id: id.to_string(),
                    status,
                }),
            ))
            .await;
        self.get(id)
    }

    /// Block until the request is decided or its timeout passes.
    ///
    /// The agent-facing blocking call: polls the store, and expires the
    /// request itself if the sweeper has not come around yet.
    pub async fn wait_for_decision(&self, id: &str) -> UpliftResult<ApprovalStatus> {
        loop {
            let request = self.get(id)?;
            if request.status.is_decided() {
                return Ok(request.status);
            }
            if Utc::now() >= request.timeout_at {
                let expired = self.store.expire_overdue(Utc::now())?;
                for expired_id in expired {
                    self.publish_expired(&expired_id).await;
                }
                let request = self.get(id)?;
                if request.status.is_decided() {
                    return Ok(request.status);
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(WAIT_POLL_INTERVAL_MS)).await;
        }
    }

    /// Expire overdue pending requests once. Returns how many expired.
    pub async fn sweep(&self) -> UpliftResult<usize> {
        let expired = self.store.expire_overdue(Utc::now())?;
        let count = expired.len();
        for id in expired {
            warn!(request_id = %id, "Approval request expired");
            self.audit
                .record("system", AuditAction::ApprovalDecision, &id, "expired");
            self.publish_expired(&id).await;
        }
        Ok(count)
    }

    async fn publish_expired(&self, id: &str) {
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::Approval(ApprovalEvent::Decided {
                    request_id: id.to_string(),
                    status: ApprovalStatus::Expired,
                }),
            ))
            .await;
    }

    /// Run the expiry sweeper until shutdown.
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) {
        let period = std::time::Duration::from_secs(self.config.sweep_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "Approval sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue_with(config: ApprovalConfig) -> ApprovalQueue {
        ApprovalQueue::new(
            ApprovalStore::new(uplift_memory::open_in_memory().unwrap()),
            config,
            Arc::new(EventBus::new()),
            Arc::new(AuditLog::new()),
        )
    }

    fn queue() -> ApprovalQueue {
        queue_with(ApprovalConfig::default())
    }

    #[test]
    fn request_id_format() {
        let at = Utc::now();
        let id = make_request_id("invoice-manager", "send_payment", at);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts[0], "AR");
        assert_eq!(parts[1], at.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].bytes().all(|b| b.is_ascii_hexdigit()));

        // Different action, same instant, different id
        let other = make_request_id("invoice-manager", "delete_records", at);
        assert_ne!(id, other);
    }

    #[tokio::test]
    async fn request_approve_flow() {
        let q = queue();
        let req = q
            .request(
                "invoice-manager",
                "send_payment",
                json!({"amount": 1250.0}),
                RiskLevel::High,
                Some("finance".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(req.status, ApprovalStatus::Pending);
        assert_eq!(q.pending().unwrap().len(), 1);

        let decided = q.approve(&req.id, "ops", Some("within budget".to_string()))
            .await
            .unwrap();
        assert_eq!(decided.status, ApprovalStatus::Approved);
        assert_eq!(decided.decided_by.as_deref(), Some("ops"));
        assert!(q.pending().unwrap().is_empty());
        assert!(q.audit.verify_integrity().is_ok());
    }

    #[tokio::test]
    async fn deny_and_cancel() {
        let q = queue();
        let a = q
            .request("a", "act", json!({}), RiskLevel::Low, None, None)
            .await
            .unwrap();
        let b = q
            .request("b", "act", json!({}), RiskLevel::Low, None, None)
            .await
            .unwrap();

        let denied = q.deny(&a.id, "ops", Some("too risky".to_string())).await.unwrap();
        assert_eq!(denied.status, ApprovalStatus::Denied);
        assert_eq!(denied.denial_reason.as_deref(), Some("too risky"));

        let cancelled = q.cancel(&b.id, "b").await.unwrap();
        assert_eq!(cancelled.status, ApprovalStatus::Cancelled);

        // Decisions are single-shot
        assert!(q.approve(&a.id, "ops", None).await.is_err());
    }

    #[tokio::test]
    async fn timeout_is_capped_by_risk_level() {
        let q = queue();
        let req = q
            .request("a", "act", json!({}), RiskLevel::Medium, None, Some(10))
            .await
            .unwrap();
        let window = req.timeout_at - req.created_at;
        assert_eq!(window.num_seconds(), 10);

        // Cannot extend beyond the configured level timeout
        let req = q
            .request("a", "act2", json!({}), RiskLevel::Medium, None, Some(999_999))
            .await
            .unwrap();
        assert_eq!(
            (req.timeout_at - req.created_at).num_seconds(),
            RiskLevel::Medium.default_timeout_secs() as i64
        );
    }

    #[tokio::test]
    async fn sweep_expires_overdue() {
        let mut config = ApprovalConfig::default();
        config.timeout_low_secs = 0;
        let q = queue_with(config);
        let req = q
            .request("a", "act", json!({}), RiskLevel::Low, None, None)
            .await
            .unwrap();

        let expired = q.sweep().await.unwrap();
        assert_eq!(expired, 1);
        assert_eq!(q.get(&req.id).unwrap().status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn wait_returns_decision() {
        let q = Arc::new(queue());
        let req = q
            .request("a", "act", json!({}), RiskLevel::Medium, None, None)
            .await
            .unwrap();

        let waiter = {
            let q = q.clone();
            let id = req.id.clone();
            tokio::spawn(async move { q.wait_for_decision(&id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        q.approve(&req.id, "ops", None).await.unwrap();

        let status = waiter.await.unwrap().unwrap();
        assert_eq!(status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn wait_expires_overdue_requests() {
        let mut config = ApprovalConfig::default();
        config.timeout_medium_secs = 0;
        let q = queue_with(config);
        let req = q
            .request("a", "act", json!({}), RiskLevel::Medium, None, None)
            .await
            .unwrap();
        let status = q.wait_for_decision(&req.id).await.unwrap();
        assert_eq!(status, ApprovalStatus::Expired);
    }
}
