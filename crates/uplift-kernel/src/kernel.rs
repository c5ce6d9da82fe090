//! The kernel facade: boots every component and exposes the checked
//! operations the HTTP API serves.

use crate::approvals::ApprovalQueue;
use crate::audit::{AuditAction, AuditLog};
use crate::config;
use crate::event_bus::EventBus;
use crate::orchestrator::Orchestrator;
use crate::process::ProcessManager;
use crate::scopes::ScopeGuard;
use crate::sessions::SessionManager;
use crate::supervisor::Supervisor;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uplift_memory::agents::AgentStore;
use uplift_memory::approvals::ApprovalStore;
use uplift_memory::events::EventStore;
use uplift_memory::store::{MemoryStore, QueryHit};
use uplift_memory::tasks::TaskStore;
use uplift_memory::Db;
use uplift_types::agent::{AgentId, AgentManifest};
use uplift_types::config::RuntimeConfig;
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::event::{Event, EventPayload, EventTarget, SystemEvent};
use uplift_types::scope::{ScopeAccess, ScopeUri};

/// Default result cap for memory queries.
const DEFAULT_QUERY_LIMIT: usize = 20;

/// A point-in-time snapshot served by `/api/status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KernelStatus {
    pub uptime_secs: u64,
    pub agents_total: usize,
    pub agents_running: usize,
    pub pending_approvals: usize,
    pub crash_count: u64,
    pub restart_count: u64,
    pub audit_tip: String,
}

/// The assembled runtime.
pub struct UpliftKernel {
    pub config: RuntimeConfig,
    pub memory: MemoryStore,
    pub agents: AgentStore,
    pub scopes: Arc<ScopeGuard>,
    pub sessions: Arc<SessionManager>,
    pub bus: Arc<EventBus>,
    pub supervisor: Arc<Supervisor>,
    pub audit: Arc<AuditLog>,
    pub orchestrator: Orchestrator,
    pub approvals: Arc<ApprovalQueue>,
    pub processes: Arc<ProcessManager>,
    started_at: DateTime<Utc>,
}

impl UpliftKernel {
    /// Boot the kernel against the configured database and discover agents.
    pub async fn boot(config: RuntimeConfig) -> UpliftResult<Arc<Self>> {
        let db = uplift_memory::open_database(&config::database_path(&config))?;
        Self::boot_with_db(config, db).await
    }

    /// Boot against an existing database handle. Test entry point.
    pub async fn boot_with_db(config: RuntimeConfig, db: Db) -> UpliftResult<Arc<Self>> {
        let memory = MemoryStore::new(db.clone());
        let agents = AgentStore::new(db.clone());
        let tasks = TaskStore::new(db.clone());
        let scopes = Arc::new(ScopeGuard::new());
        let sessions = Arc::new(SessionManager::new());
        let bus = Arc::new(EventBus::with_store(EventStore::new(db.clone())));
        let supervisor = Arc::new(Supervisor::new());
        let audit = Arc::new(AuditLog::new());

        let orchestrator = Orchestrator::new(
            agents.clone(),
            tasks,
            scopes.clone(),
            bus.clone(),
            audit.clone(),
        );
        let approvals = Arc::new(ApprovalQueue::new(
            ApprovalStore::new(db),
            config.approvals.clone(),
            bus.clone(),
            audit.clone(),
        ));
        let processes = Arc::new(ProcessManager::new(
            agents.clone(),
            supervisor.clone(),
            sessions.clone(),
            bus.clone(),
            audit.clone(),
            config.supervision.clone(),
            format!("http://{}", config.api_listen),
        ));

        let kernel = Arc::new(Self {
            config,
            memory,
            agents,
            scopes,
            sessions,
            bus,
            supervisor,
            audit,
            orchestrator,
            approvals,
            processes,
            started_at: Utc::now(),
        });

        // Rebuild the grant table from whatever is already registered.
        for entry in kernel.agents.list()? {
            kernel
                .scopes
                .register_agent(&entry.manifest.name, entry.manifest.scopes.clone());
        }

        kernel
            .bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::System(SystemEvent::KernelStarted),
            ))
            .await;
        info!("Kernel booted");
        Ok(kernel)
    }

    /// Scan the agents directory for `agent.yaml` manifests and register
    /// each one. Malformed manifests are skipped with a warning.
    pub fn discover_agents(&self, dir: &Path) -> UpliftResult<usize> {
        if !dir.exists() {
            info!(dir = %dir.display(), "Agents directory does not exist, nothing to discover");
            return Ok(0);
        }
        let mut count = 0;
        for entry in walkdir::WalkDir::new(dir)
            .max_depth(3)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.file_name() == "agent.yaml" {
                match std::fs::read_to_string(entry.path())
                    .map_err(UpliftError::Io)
                    .and_then(|yaml| AgentManifest::from_yaml(&yaml))
                {
                    Ok(mut manifest) => {
                        if manifest.entrypoint.working_dir.is_none() {
                            manifest.entrypoint.working_dir =
                                entry.path().parent().map(|p| p.to_path_buf());
                        }
                        self.register_manifest(manifest)?;
                        count += 1;
                    }
                    Err(e) => {
                        warn!(
                            path = %entry.path().display(),
                            error = %e,
                            "Skipping malformed agent manifest"
                        );
                    }
                }
            }
        }
        info!(count, dir = %dir.display(), "Agent discovery finished");
        Ok(count)
    }

    /// Register (or update) one agent from its manifest.
    pub fn register_manifest(&self, manifest: AgentManifest) -> UpliftResult<AgentId> {
        manifest.validate()?;
        let id = match self.agents.get(&manifest.name)? {
            Some(existing) => existing.id,
            None => AgentId::new(),
        };
        self.agents.register(id, &manifest)?;
        self.scopes
            .register_agent(&manifest.name, manifest.scopes.clone());
        info!(agent = %manifest.name, "Agent registered");
        Ok(id)
    }

    /// Start every registered agent. Used with `auto_start`.
    pub async fn start_all(&self) {
        match self.agents.list() {
            Ok(entries) => {
                // Higher manifest priority boots first.
                let mut entries = entries;
                entries.sort_by(|a, b| b.manifest.priority.cmp(&a.manifest.priority));
                for entry in entries {
                    if let Err(e) = self.processes.start(&entry.manifest.name).await {
                        warn!(agent = %entry.manifest.name, error = %e, "Auto-start failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not list agents for auto-start"),
        }
    }

    /// Spawn the health loop and the approval sweeper.
    pub fn start_background_tasks(self: &Arc<Self>) {
        let kernel = self.clone();
        let shutdown = self.supervisor.subscribe();
        tokio::spawn(async move {
            kernel.processes.run_health_loop(shutdown).await;
        });

        let kernel = self.clone();
        let shutdown = self.supervisor.subscribe();
        tokio::spawn(async move {
            kernel.approvals.run_sweeper(shutdown).await;
        });
    }

    // -- Memory operations (scope-checked) --

    /// Read a key. The caller identity comes from the verified session.
    pub fn memory_get(
        &self,
        agent: &str,
        scope: &ScopeUri,
        key: &str,
    ) -> UpliftResult<Option<serde_json::Value>> {
        self.check_scope(agent, scope, ScopeAccess::Read)?;
        let value = self.memory.get(scope, key)?;
        self.audit.record(
            agent,
            AuditAction::MemoryRead,
            format!("{scope} key={key}"),
            if value.is_some() { "ok" } else { "absent" },
        );
        Ok(value)
    }

    /// Write a key, returning its new version.
    pub fn memory_set(
        &self,
        agent: &str,
        scope: &ScopeUri,
        key: &str,
        value: &serde_json::Value,
    ) -> UpliftResult<u64> {
        self.check_scope(agent, scope, ScopeAccess::Write)?;
        let version = self.memory.set(scope, key, value)?;
        self.audit.record(
            agent,
            AuditAction::MemoryWrite,
            format!("{scope} key={key} v{version}"),
            "ok",
        );
        Ok(version)
    }

    /// Delete a key. Returns whether it existed.
    pub fn memory_delete(&self, agent: &str, scope: &ScopeUri, key: &str) -> UpliftResult<bool> {
        self.check_scope(agent, scope, ScopeAccess::Write)?;
        let existed = self.memory.delete(scope, key)?;
        self.audit.record(
            agent,
            AuditAction::MemoryDelete,
            format!("{scope} key={key}"),
            "ok",
        );
        Ok(existed)
    }

    /// List the keys of one scope.
    pub fn memory_list(
        &self,
        agent: &str,
        scope: &ScopeUri,
    ) -> UpliftResult<Vec<(String, serde_json::Value)>> {
        self.check_scope(agent, scope, ScopeAccess::Read)?;
        self.memory.list(scope)
    }

    /// Search across scopes. With an explicit scope list every scope must
    /// be readable; without one, the agent's readable scopes are searched.
    pub fn memory_query(
        &self,
        agent: &str,
        text: &str,
        scopes: Option<Vec<ScopeUri>>,
        limit: Option<usize>,
    ) -> UpliftResult<Vec<QueryHit>> {
        let scopes = match scopes {
            Some(scopes) => {
                for scope in &scopes {
                    self.check_scope(agent, scope, ScopeAccess::Read)?;
                }
                scopes
            }
            None => self.scopes.readable_scopes(agent),
        };
        let hits = self
            .memory
            .query(text, &scopes, limit.unwrap_or(DEFAULT_QUERY_LIMIT))?;
        self.audit.record(
            agent,
            AuditAction::MemoryQuery,
            format!("'{text}' over {} scopes", scopes.len()),
            format!("{} hits", hits.len()),
        );
        Ok(hits)
    }

    fn check_scope(&self, agent: &str, scope: &ScopeUri, access: ScopeAccess) -> UpliftResult<()> {
        match self.scopes.check(agent, scope, access) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(agent, scope = %scope, "Scope access denied");
                self.audit
                    .record(agent, AuditAction::ScopeCheck, scope.to_string(), "denied");
                Err(err)
            }
        }
    }

    // -- Introspection --

    /// A point-in-time status snapshot.
    pub async fn status(&self) -> UpliftResult<KernelStatus> {
        let agents = self.agents.list()?;
        Ok(KernelStatus {
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            agents_total: agents.len(),
            agents_running: self.processes.running_count().await,
            pending_approvals: self.approvals.pending()?.len(),
            crash_count: self.supervisor.crash_count(),
            restart_count: self.supervisor.restart_count(),
            audit_tip: self.audit.tip_hash(),
        })
    }

    /// Graceful shutdown: stop loops, then stop every agent.
    pub async fn shutdown(&self) {
        info!("Kernel shutting down");
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::Broadcast,
                EventPayload::System(SystemEvent::KernelStopping),
            ))
            .await;
        self.supervisor.shutdown();
        self.processes.shutdown_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn kernel() -> Arc<UpliftKernel> {
        UpliftKernel::boot_with_db(
            RuntimeConfig::default(),
            uplift_memory::open_in_memory().unwrap(),
        )
        .await
        .unwrap()
    }

    fn manifest(name: &str, scopes_yaml: &str) -> AgentManifest {
        AgentManifest::from_yaml(&format!(
            "name: {name}\nentrypoint:\n  command: python3\n{scopes_yaml}"
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn memory_ops_enforce_scopes() {
        let kernel = kernel().await;
        kernel
            .register_manifest(manifest(
                "research-agent",
                "scopes:\n  - scope: uplift://user/prefs\n    access: read\n",
            ))
            .unwrap();

        let private: ScopeUri = "uplift://agent/research-agent".parse().unwrap();
        let prefs: ScopeUri = "uplift://user/prefs".parse().unwrap();
        let forbidden: ScopeUri = "uplift://user/financial".parse().unwrap();

        // Owner scope: full access
        let v = kernel
            .memory_set("research-agent", &private, "notes", &json!("draft"))
            .unwrap();
        assert_eq!(v, 1);
        assert_eq!(
            kernel.memory_get("research-agent", &private, "notes").unwrap(),
            Some(json!("draft"))
        );

        // Read-only grant refuses writes
        assert!(kernel
            .memory_get("research-agent", &prefs, "style")
            .unwrap()
            .is_none());
        assert!(matches!(
            kernel.memory_set("research-agent", &prefs, "style", &json!("x")),
            Err(UpliftError::ScopeDenied(_))
        ));

        // Ungranted scope refuses everything, and the denial is audited
        assert!(kernel
            .memory_get("research-agent", &forbidden, "card")
            .is_err());
        let recent = kernel.audit.recent(1);
        assert_eq!(recent[0].outcome, "denied");
        assert!(kernel.audit.verify_integrity().is_ok());
    }

    #[tokio::test]
    async fn query_defaults_to_readable_scopes() {
        let kernel = kernel().await;
        kernel
            .register_manifest(manifest("a", ""))
            .unwrap();
        kernel
            .register_manifest(manifest("b", ""))
            .unwrap();

        let a_scope: ScopeUri = "uplift://agent/a".parse().unwrap();
        let b_scope: ScopeUri = "uplift://agent/b".parse().unwrap();
        kernel.memory_set("a", &a_scope, "report", &json!("alpha")).unwrap();
        kernel.memory_set("b", &b_scope, "report", &json!("beta")).unwrap();

        // Default scope set only covers a's own memory
        let hits = kernel.memory_query("a", "report", None, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, json!("alpha"));

        // Asking for someone else's scope explicitly is denied
        assert!(kernel
            .memory_query("a", "report", Some(vec![b_scope]), None)
            .is_err());
    }

    #[tokio::test]
    async fn discovery_registers_manifests(){
        let kernel = kernel().await;
        let dir = tempfile::tempdir().unwrap();
        let agent_dir = dir.path().join("research-agent");
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(
            agent_dir.join("agent.yaml"),
            "name: research-agent\nentrypoint:\n  command: python3\n  args: [\"agent.py\"]\n",
        )
        .unwrap();
        // A malformed manifest is skipped, not fatal
        let bad_dir = dir.path().join("broken");
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join("agent.yaml"), "name: [").unwrap();

        let count = kernel.discover_agents(dir.path()).unwrap();
        assert_eq!(count, 1);
        let entry = kernel.agents.get("research-agent").unwrap().unwrap();
        assert_eq!(entry.manifest.entrypoint.working_dir, Some(agent_dir));

        // Missing directory is fine
        assert_eq!(
            kernel.discover_agents(&dir.path().join("absent")).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn published_events_are_persisted() {
        let db = uplift_memory::open_in_memory().unwrap();
        let kernel = UpliftKernel::boot_with_db(RuntimeConfig::default(), db.clone())
            .await
            .unwrap();
        let events = EventStore::new(db);

        // Boot itself leaves a KernelStarted row behind
        assert_eq!(events.count().unwrap(), 1);

        kernel.register_manifest(manifest("a", "")).unwrap();
        kernel.register_manifest(manifest("b", "")).unwrap();
        kernel
            .orchestrator
            .delegate(
                "a",
                uplift_types::task::DelegationRequest {
                    target_agent_id: "b".to_string(),
                    objective: "summarise findings".to_string(),
                    input_data: json!(null),
                    shared_scopes: vec![],
                    priority: Default::default(),
                },
            )
            .await
            .unwrap();

        assert!(events.count().unwrap() >= 2);
        let recent = events.recent(10).unwrap();
        assert!(recent.iter().any(|e| matches!(
            e.payload,
            EventPayload::Task(uplift_types::event::TaskEvent::Delegated { .. })
        )));
    }

    #[tokio::test]
    async fn status_snapshot() {
        let kernel = kernel().await;
        kernel.register_manifest(manifest("a", "")).unwrap();
        let status = kernel.status().await.unwrap();
        assert_eq!(status.agents_total, 1);
        assert_eq!(status.agents_running, 0);
        assert_eq!(status.pending_approvals, 0);
    }
}
