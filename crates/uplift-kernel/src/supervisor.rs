//! Shutdown signalling and restart accounting for supervised agents.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal manager with restart accounting.
///
/// Process handling itself lives in [`crate::process::ProcessManager`];
/// the supervisor is the bookkeeping underneath it.
pub struct Supervisor {
    /// Send side of the shutdown signal.
    shutdown_tx: watch::Sender<bool>,
    /// Receive side of the shutdown signal (clonable).
    shutdown_rx: watch::Receiver<bool>,
    /// Total restarts across all agents.
    restart_count: AtomicU64,
    /// Total abnormal exits observed across all agents.
    crash_count: AtomicU64,
    /// Per-agent restart counts for enforcing restart budgets.
    agent_restarts: DashMap<String, u32>,
}

impl Supervisor {
    /// Create a new supervisor.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
            restart_count: AtomicU64::new(0),
            crash_count: AtomicU64::new(0),
            agent_restarts: DashMap::new(),
        }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        info!("Supervisor: initiating graceful shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Record that an agent process exited abnormally.
    pub fn record_crash(&self, agent: &str) {
        self.crash_count.fetch_add(1, Ordering::Relaxed);
        warn!(
            agent,
            total_crashes = self.crash_count.load(Ordering::Relaxed),
            "Agent crash recorded"
        );
    }

    /// Get the total number of crashes observed.
    pub fn crash_count(&self) -> u64 {
        self.crash_count.load(Ordering::Relaxed)
    }

    /// Get the total number of restarts.
    pub fn restart_count(&self) -> u64 {
        self.restart_count.load(Ordering::Relaxed)
    }

    /// Record a restart for a specific agent and check it against the budget.
    ///
    /// Returns Ok(restart_count) if within the budget, or Err(count) if the
    /// budget is exhausted. A budget of 0 means unlimited.
    pub fn record_agent_restart(&self, agent: &str, max_restarts: u32) -> Result<u32, u32> {
        let mut count = self.agent_restarts.entry(agent.to_string()).or_insert(0);
        *count += 1;
        self.restart_count.fetch_add(1, Ordering::Relaxed);

        if max_restarts > 0 && *count > max_restarts {
            warn!(
                agent,
                restarts = *count,
                max = max_restarts,
                "Agent exceeded restart budget"
            );
            Err(*count)
        } else {
            Ok(*count)
        }
    }

    /// Get the restart count for a specific agent.
    pub fn agent_restart_count(&self, agent: &str) -> u32 {
        self.agent_restarts.get(agent).map(|r| *r).unwrap_or(0)
    }

    /// Reset restart counter for an agent (e.g. on manual start).
    pub fn reset_agent_restarts(&self, agent: &str) {
        self.agent_restarts.remove(agent);
    }

    /// Get a health summary.
    pub fn health(&self) -> SupervisorHealth {
        SupervisorHealth {
            is_shutting_down: self.is_shutting_down(),
            crash_count: self.crash_count(),
            restart_count: self.restart_count(),
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Health report from the supervisor.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SupervisorHealth {
    pub is_shutting_down: bool,
    pub crash_count: u64,
    pub restart_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_signal() {
        let supervisor = Supervisor::new();
        assert!(!supervisor.is_shutting_down());
        supervisor.shutdown();
        assert!(supervisor.is_shutting_down());
    }

    #[test]
    fn subscribe_sees_shutdown() {
        let supervisor = Supervisor::new();
        let rx = supervisor.subscribe();
        assert!(!*rx.borrow());
        supervisor.shutdown();
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn crash_tracking() {
        let supervisor = Supervisor::new();
        assert_eq!(supervisor.crash_count(), 0);
        supervisor.record_crash("a");
        supervisor.record_crash("a");
        assert_eq!(supervisor.crash_count(), 2);
    }

    #[test]
    fn restart_within_budget() {
        let supervisor = Supervisor::new();
        assert!(supervisor.record_agent_restart("a", 3).is_ok());
        assert_eq!(supervisor.agent_restart_count("a"), 1);
        assert!(supervisor.record_agent_restart("a", 3).is_ok());
        assert!(supervisor.record_agent_restart("a", 3).is_ok());
        assert_eq!(supervisor.agent_restart_count("a"), 3);
    }

    #[test]
    fn restart_exceeds_budget() {
        let supervisor = Supervisor::new();
        assert!(supervisor.record_agent_restart("a", 2).is_ok());
        assert!(supervisor.record_agent_restart("a", 2).is_ok());
        let result = supervisor.record_agent_restart("a", 2);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err(), 3);
    }

    #[test]
    fn zero_budget_means_unlimited() {
        let supervisor = Supervisor::new();
        for _ in 0..100 {
            assert!(supervisor.record_agent_restart("a", 0).is_ok());
        }
    }

    #[test]
    fn reset_restarts() {
        let supervisor = Supervisor::new();
        supervisor.record_agent_restart("a", 10).unwrap();
        supervisor.record_agent_restart("a", 10).unwrap();
        assert_eq!(supervisor.agent_restart_count("a"), 2);

        supervisor.reset_agent_restarts("a");
        assert_eq!(supervisor.agent_restart_count("a"), 0);
    }
}
