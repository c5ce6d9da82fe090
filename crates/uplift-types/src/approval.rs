//! Human-in-the-loop approval requests.
//!
//! Agents submit an approval request before performing a risky action and
//! block (poll) until a human decides or the request times out. Every
//! decision is recorded in the approval audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk classification of the action awaiting approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Canonical lowercase name, as stored and served.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse from the stored lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Default decision timeout in seconds for this risk level.
    /// Riskier actions wait longer for a human rather than auto-expiring.
    pub fn default_timeout_secs(&self) -> u64 {
        match self {
            Self::Low => 900,
            Self::Medium => 1800,
            Self::High => 3600,
            Self::Critical => 7200,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a decision.
    Pending,
    Approved,
    Denied,
    /// No decision arrived before `timeout_at`.
    Expired,
    /// Withdrawn by the requesting agent.
    Cancelled,
}

impl ApprovalStatus {
    /// Canonical lowercase name, as stored and served.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the stored lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a decision has been reached (including expiry).
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An approval request, keyed by an `AR-<millis>-<hash8>` request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request id, e.g. `AR-1755900000000-a1b2c3d4`.
    pub id: String,
    /// Name of the requesting agent.
    pub agent: String,
    /// The action awaiting approval, e.g. `send_payment`.
    pub action: String,
    /// Structured detail shown to the approver.
    pub details: serde_json::Value,
    pub risk_level: RiskLevel,
    /// Optional free-form category for filtering (e.g. `finance`).
    pub category: Option<String>,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    /// When a pending request expires.
    pub timeout_at: DateTime<Utc>,
    /// Who decided, for approved/denied requests.
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Reason supplied with a denial.
    pub denial_reason: Option<String>,
    /// Free-form comment supplied with an approval.
    pub comment: Option<String>,
}

/// One row of the approval audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalAuditEntry {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    /// What happened: `created`, `approved`, `denied`, `expired`, `cancelled`.
    pub action: String,
    /// Who did it (an agent name or approver id).
    pub actor: String,
    pub details: Option<String>,
}
