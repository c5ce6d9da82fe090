//! Hash chain audit trail for security-critical actions.
//!
//! Every auditable event is appended to an append-only log where each entry
//! contains the SHA-256 hash of its own contents concatenated with the hash
//! of the previous entry, forming a tamper-evident chain.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// Categories of auditable actions within the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditAction {
    MemoryRead,
    MemoryWrite,
    MemoryDelete,
    MemoryQuery,
    ScopeCheck,
    Delegate,
    TaskComplete,
    ApprovalRequest,
    ApprovalDecision,
    AgentSpawn,
    AgentStop,
    AgentRestart,
    EmergencyStop,
    AuthAttempt,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single entry in the hash chain audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonically increasing sequence number (0-indexed).
    pub seq: u64,
    /// ISO-8601 timestamp of when this entry was recorded.
    pub timestamp: String,
    /// The agent that triggered (or is the subject of) this action.
    pub agent: String,
    /// The category of action being audited.
    pub action: AuditAction,
    /// Free-form detail about the action (e.g. scope and key).
    pub detail: String,
    /// The outcome of the action (e.g. "ok", "denied", an error message).
    pub outcome: String,
    /// SHA-256 hash of the previous entry (or all-zeros for the genesis).
    pub prev_hash: String,
    /// SHA-256 hash of this entry's content concatenated with `prev_hash`.
    pub hash: String,
}

/// Computes the SHA-256 hash for a single audit entry from its fields.
///
/// Every variable-length field is length-prefixed so that no two distinct
/// field tuples share a preimage (e.g. detail "ab" + outcome "c" hashing
/// the same as "a" + "bc").
fn compute_entry_hash(
    seq: u64,
    timestamp: &str,
    agent: &str,
    action: &AuditAction,
    detail: &str,
    outcome: &str,
    prev_hash: &str,
) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    field(&mut hasher, timestamp.as_bytes());
    field(&mut hasher, agent.as_bytes());
    field(&mut hasher, action.to_string().as_bytes());
    field(&mut hasher, detail.as_bytes());
    field(&mut hasher, outcome.as_bytes());
    field(&mut hasher, prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// An append-only, tamper-evident audit log using a hash chain.
///
/// Thread-safe; all access is serialised through internal mutexes.
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    tip: Mutex<String>,
}

impl AuditLog {
    /// Creates a new empty audit log.
    ///
    /// The initial tip hash is 64 zero characters (the "genesis" sentinel).
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            tip: Mutex::new("0".repeat(64)),
        }
    }

    /// Records a new auditable event and returns the SHA-256 hash of the entry.
    ///
    /// The entry is atomically appended to the chain with the current tip as
    /// its `prev_hash`, and the tip is advanced to the new hash.
    pub fn record(
        &self,
        agent: impl Into<String>,
        action: AuditAction,
        detail: impl Into<String>,
        outcome: impl Into<String>,
    ) -> String {
        let agent = agent.into();
        let detail = detail.into();
        let outcome = outcome.into();
        let timestamp = Utc::now().to_rfc3339();

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut tip = self.tip.lock().unwrap_or_else(|e| e.into_inner());

        let seq = entries.len() as u64;
        let prev_hash = tip.clone();

        let hash = compute_entry_hash(
            seq, &timestamp, &agent, &action, &detail, &outcome, &prev_hash,
        );

        entries.push(AuditEntry {
            seq,
            timestamp,
            agent,
            action,
            detail,
            outcome,
            prev_hash,
            hash: hash.clone(),
        });

        *tip = hash.clone();
        hash
    }

    /// Walks the entire chain and recomputes every hash to detect tampering.
    ///
    /// Returns `Ok(())` if the chain is intact, or `Err(msg)` describing
    /// the first inconsistency found.
    pub fn verify_integrity(&self) -> Result<(), String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut expected_prev = "0".repeat(64);

        for entry in entries.iter() {
            if entry.prev_hash != expected_prev {
                return Err(format!(
                    "chain break at seq {}: expected prev_hash {} but found {}",
                    entry.seq, expected_prev, entry.prev_hash
                ));
            }

            let recomputed = compute_entry_hash(
                entry.seq,
                &entry.timestamp,
                &entry.agent,
                &entry.action,
                &entry.detail,
                &entry.outcome,
                &entry.prev_hash,
            );

            if recomputed != entry.hash {
                return Err(format!(
                    "hash mismatch at seq {}: expected {} but found {}",
                    entry.seq, recomputed, entry.hash
                ));
            }

            expected_prev = entry.hash.clone();
        }

        Ok(())
    }

    /// Returns the current tip hash (the hash of the most recent entry,
    /// or the genesis sentinel if the log is empty).
    pub fn tip_hash(&self) -> String {
        self.tip.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns the number of entries in the log.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Returns up to the most recent `n` entries (cloned).
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_integrity() {
        let log = AuditLog::new();
        log.record(
            "research-agent",
            AuditAction::MemoryWrite,
            "uplift://shared/research key=sources",
            "ok",
        );
        log.record(
            "research-agent",
            AuditAction::ScopeCheck,
            "uplift://user/financial-prefs read",
            "denied",
        );
        log.record("writer-agent", AuditAction::Delegate, "to research-agent", "ok");
        log.record(
            "invoice-manager",
            AuditAction::ApprovalRequest,
            "send_payment",
            "pending",
        );

        assert_eq!(log.len(), 4);
        assert!(log.verify_integrity().is_ok());

        let entries = log.recent(4);
        assert_eq!(entries[0].prev_hash, "0".repeat(64));
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert_eq!(entries[2].prev_hash, entries[1].hash);
        assert_eq!(entries[3].prev_hash, entries[2].hash);
    }

    #[test]
    fn tamper_detection() {
        let log = AuditLog::new();
        log.record("a", AuditAction::MemoryRead, "scope key", "ok");
        log.record("a", AuditAction::ScopeCheck, "write denied", "denied");
        log.record("a", AuditAction::MemoryRead, "scope key2", "ok");

        {
            let mut entries = log.entries.lock().unwrap();
            entries[1].outcome = "ok".to_string();
        }

        let result = log.verify_integrity();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("hash mismatch at seq 1"));
    }

    #[test]
    fn shifted_field_boundaries_hash_differently() {
        let genesis = "0".repeat(64);
        let a = compute_entry_hash(
            0,
            "2026-01-01T00:00:00Z",
            "agent",
            &AuditAction::MemoryWrite,
            "ab",
            "c",
            &genesis,
        );
        let b = compute_entry_hash(
            0,
            "2026-01-01T00:00:00Z",
            "agent",
            &AuditAction::MemoryWrite,
            "a",
            "bc",
            &genesis,
        );
        assert_ne!(a, b);

        let c = compute_entry_hash(
            0,
            "2026-01-01T00:00:00Z",
            "agentx",
            &AuditAction::MemoryWrite,
            "ab",
            "c",
            &genesis,
        );
        let d = compute_entry_hash(
            0,
            "2026-01-01T00:00:00Z",
            "agent",
            &AuditAction::MemoryWrite,
            "xab",
            "c",
            &genesis,
        );
        assert_ne!(c, d);
    }

    #[test]
    fn tip_changes() {
        let log = AuditLog::new();
        let genesis_tip = log.tip_hash();
        assert_eq!(genesis_tip, "0".repeat(64));

        let h1 = log.record("a", AuditAction::AgentSpawn, "spawn", "ok");
        assert_eq!(log.tip_hash(), h1);
        assert_ne!(log.tip_hash(), genesis_tip);

        let h2 = log.record("b", AuditAction::AgentStop, "stop", "ok");
        assert_eq!(log.tip_hash(), h2);
        assert_ne!(h2, h1);
    }
}
