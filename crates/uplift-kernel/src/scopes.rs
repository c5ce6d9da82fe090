//! The scope guard: every memory operation passes through here.
//!
//! An agent's grants come from three places:
//! 1. the implicit owner grant: read-write on `uplift://agent/<name>`,
//! 2. the scope list in its manifest,
//! 3. temporary delegation grants attached to a task it is running.
//!
//! Delegation grants are installed when a task is delegated and revoked
//! when the task reaches a terminal state. A failed check is final: the
//! caller maps it to a terminated request.

use dashmap::DashMap;
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::scope::{ScopeAccess, ScopeGrant, ScopeUri};
use uplift_types::task::TaskId;

/// In-memory grant table, rebuilt from manifests at boot.
pub struct ScopeGuard {
    /// Manifest grants per agent name.
    manifest_grants: DashMap<String, Vec<ScopeGrant>>,
    /// Active delegation grants: task -> (target agent, scopes).
    task_grants: DashMap<TaskId, (String, Vec<ScopeUri>)>,
}

impl ScopeGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self {
            manifest_grants: DashMap::new(),
            task_grants: DashMap::new(),
        }
    }

    /// Install (or replace) an agent's manifest grants.
    pub fn register_agent(&self, agent: &str, grants: Vec<ScopeGrant>) {
        self.manifest_grants.insert(agent.to_string(), grants);
    }

    /// Remove an agent's manifest grants.
    pub fn unregister_agent(&self, agent: &str) {
        self.manifest_grants.remove(agent);
    }

    /// Check that `agent` may access `scope` with the requested mode.
    pub fn check(&self, agent: &str, scope: &ScopeUri, access: ScopeAccess) -> UpliftResult<()> {
        // Owner grant: full access to the agent's private scope.
        if let Ok(owner_scope) = ScopeUri::agent_private(agent) {
            if *scope == owner_scope {
                return Ok(());
            }
        }

        // Manifest grants.
        if let Some(grants) = self.manifest_grants.get(agent) {
            if grants
                .iter()
                .any(|g| g.scope == *scope && g.access.allows(access))
            {
                return Ok(());
            }
        }

        // Delegation grants give read-write for the task's lifetime.
        for entry in self.task_grants.iter() {
            let (target, scopes) = entry.value();
            if target == agent && scopes.contains(scope) {
                return Ok(());
            }
        }

        Err(UpliftError::ScopeDenied(format!(
            "{agent} may not {} {scope}",
            match access {
                ScopeAccess::Read => "read",
                ScopeAccess::Write => "write",
                ScopeAccess::ReadWrite => "read-write",
            }
        )))
    }

    /// Install delegation grants for a task.
    pub fn install_task_grants(&self, task_id: TaskId, target: &str, scopes: Vec<ScopeUri>) {
        if !scopes.is_empty() {
            self.task_grants
                .insert(task_id, (target.to_string(), scopes));
        }
    }

    /// Revoke the delegation grants of a finished task.
    pub fn revoke_task_grants(&self, task_id: TaskId) {
        self.task_grants.remove(&task_id);
    }

    /// Every scope `agent` can currently read. Used as the default scope
    /// set for memory queries.
    pub fn readable_scopes(&self, agent: &str) -> Vec<ScopeUri> {
        let mut scopes = Vec::new();
        if let Ok(owner) = ScopeUri::agent_private(agent) {
            scopes.push(owner);
        }
        if let Some(grants) = self.manifest_grants.get(agent) {
            for grant in grants.iter() {
                if grant.access.allows(ScopeAccess::Read) && !scopes.contains(&grant.scope) {
                    scopes.push(grant.scope.clone());
                }
            }
        }
        for entry in self.task_grants.iter() {
            let (target, task_scopes) = entry.value();
            if target == agent {
                for scope in task_scopes {
                    if !scopes.contains(scope) {
                        scopes.push(scope.clone());
                    }
                }
            }
        }
        scopes
    }
}

impl Default for ScopeGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(s: &str) -> ScopeUri {
        s.parse().unwrap()
    }

    #[test]
    fn owner_scope_always_allowed() {
        let guard = ScopeGuard::new();
        let private = scope("uplift://agent/writer-agent");
        assert!(guard
            .check("writer-agent", &private, ScopeAccess::ReadWrite)
            .is_ok());
        assert!(guard
            .check("other-agent", &private, ScopeAccess::Read)
            .is_err());
    }

    #[test]
    fn manifest_grants_respect_access_mode() {
        let guard = ScopeGuard::new();
        guard.register_agent(
            "research-agent",
            vec![ScopeGrant {
                scope: scope("uplift://user/research-prefs"),
                access: ScopeAccess::Read,
            }],
        );

        let prefs = scope("uplift://user/research-prefs");
        assert!(guard
            .check("research-agent", &prefs, ScopeAccess::Read)
            .is_ok());
        assert!(guard
            .check("research-agent", &prefs, ScopeAccess::Write)
            .is_err());

        // Unregistered agent has nothing
        assert!(guard.check("stranger", &prefs, ScopeAccess::Read).is_err());
    }

    #[test]
    fn delegation_grants_are_task_scoped() {
        let guard = ScopeGuard::new();
        let shared = scope("uplift://shared/research-output");
        let task = TaskId::new();

        assert!(guard
            .check("writer-agent", &shared, ScopeAccess::Write)
            .is_err());

        guard.install_task_grants(task, "writer-agent", vec![shared.clone()]);
        assert!(guard
            .check("writer-agent", &shared, ScopeAccess::Write)
            .is_ok());
        // The grant names the target only
        assert!(guard
            .check("research-agent", &shared, ScopeAccess::Read)
            .is_err());

        guard.revoke_task_grants(task);
        assert!(guard
            .check("writer-agent", &shared, ScopeAccess::Write)
            .is_err());
    }

    #[test]
    fn readable_scopes_union() {
        let guard = ScopeGuard::new();
        guard.register_agent(
            "a",
            vec![
                ScopeGrant {
                    scope: scope("uplift://user/prefs"),
                    access: ScopeAccess::Read,
                },
                ScopeGrant {
                    scope: scope("uplift://shared/write-only"),
                    access: ScopeAccess::Write,
                },
            ],
        );
        let task = TaskId::new();
        guard.install_task_grants(task, "a", vec![scope("uplift://shared/task-data")]);

        let scopes = guard.readable_scopes("a");
        assert!(scopes.contains(&scope("uplift://agent/a")));
        assert!(scopes.contains(&scope("uplift://user/prefs")));
        assert!(scopes.contains(&scope("uplift://shared/task-data")));
        // Write-only grants are not readable
        assert!(!scopes.contains(&scope("uplift://shared/write-only")));
    }
}
