//! Task orchestration: the agent directory, delegation, claiming, and
//! completion.

use crate::audit::{AuditAction, AuditLog};
use crate::event_bus::EventBus;
use crate::scopes::ScopeGuard;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uplift_memory::agents::AgentStore;
use uplift_memory::tasks::TaskStore;
use uplift_types::agent::{AgentId, AgentStatus};
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::event::{Event, EventPayload, EventTarget, TaskEvent};
use uplift_types::scope::ScopeAccess;
use uplift_types::task::{
    CompletionReport, DelegationRequest, TaskContext, TaskId, TaskOutcome, TaskRecord, TaskStatus,
};

/// One row of the agent directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub description: String,
    pub status: AgentStatus,
    pub priority: u8,
}

/// The orchestration gateway agents delegate work through.
pub struct Orchestrator {
    agents: AgentStore,
    tasks: TaskStore,
    scopes: Arc<ScopeGuard>,
    bus: Arc<EventBus>,
    audit: Arc<AuditLog>,
}

impl Orchestrator {
    pub fn new(
        agents: AgentStore,
        tasks: TaskStore,
        scopes: Arc<ScopeGuard>,
        bus: Arc<EventBus>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            agents,
            tasks,
            scopes,
            bus,
            audit,
        }
    }

    /// The agent directory: who exists, what they do, whether they run.
    pub fn directory(&self) -> UpliftResult<Vec<DirectoryEntry>> {
        Ok(self
            .agents
            .list()?
            .into_iter()
            .map(|entry| DirectoryEntry {
                name: entry.manifest.name,
                description: entry.manifest.description,
                status: entry.status,
                priority: entry.manifest.priority,
            })
            .collect())
    }

    /// Delegate a task from `source` to the request's target agent.
    ///
    /// The delegator must hold read access on every scope it shares; the
    /// target receives those scopes for the task's lifetime.
    pub async fn delegate(&self, source: &str, req: DelegationRequest) -> UpliftResult<TaskId> {
        let target = self
            .agents
            .get(&req.target_agent_id)?
            .ok_or_else(|| UpliftError::AgentNotFound(req.target_agent_id.clone()))?;
        let target_name = target.manifest.name;

        if target_name == source {
            return Err(UpliftError::InvalidInput(
                "an agent cannot delegate to itself".to_string(),
            ));
        }

        // You can only share what you can read.
        for scope in &req.shared_scopes {
            if let Err(err) = self.scopes.check(source, scope, ScopeAccess::Read) {
                self.audit.record(
                    source,
                    AuditAction::Delegate,
                    format!("share {scope} with {target_name}"),
                    "denied",
                );
                return Err(err);
            }
        }

        let record = TaskRecord {
            id: TaskId::new(),
            source_agent: source.to_string(),
            target_agent: target_name.clone(),
            objective: req.objective,
            input_data: req.input_data,
            shared_scopes: req.shared_scopes.clone(),
            priority: req.priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output_memory_key: None,
            error: None,
        };
        self.tasks.insert(&record)?;
        self.scopes
            .install_task_grants(record.id, &target_name, req.shared_scopes);

        info!(
            task_id = %record.id,
            source,
            target = %target_name,
            priority = %record.priority.as_str(),
            "Task delegated"
        );
        self.audit.record(
            source,
            AuditAction::Delegate,
            format!("task {} to {target_name}", record.id),
            "ok",
        );
        self.bus
            .publish(Event::new(
                target.id,
                EventTarget::Agent(target.id),
                EventPayload::Task(TaskEvent::Delegated {
                    task_id: record.id,
                    source: source.to_string(),
                    target: target_name,
                }),
            ))
            .await;

        Ok(record.id)
    }

    /// The task `agent` should work on now.
    ///
    /// Returns the task it is already running, or claims the next pending
    /// one (highest priority first). None when the queue is empty.
    pub async fn current_task(&self, agent: &str) -> UpliftResult<Option<TaskContext>> {
        if let Some(running) = self.tasks.running_for(agent)? {
            return Ok(Some(TaskContext::from(&running)));
        }
        let Some(claimed) = self.tasks.claim_next(agent)? else {
            return Ok(None);
        };
        info!(task_id = %claimed.id, agent, "Task claimed");
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::Task(TaskEvent::Claimed {
                    task_id: claimed.id,
                    target: agent.to_string(),
                }),
            ))
            .await;
        Ok(Some(TaskContext::from(&claimed)))
    }

    /// Accept a completion report from the target agent.
    ///
    /// Finalizes the task, revokes its delegation grants, and notifies the
    /// delegator.
    pub async fn complete(&self, agent: &str, report: CompletionReport) -> UpliftResult<()> {
        let task = self
            .tasks
            .get(report.task_id)?
            .ok_or_else(|| UpliftError::TaskNotFound(report.task_id.to_string()))?;
        if task.target_agent != agent {
            self.audit.record(
                agent,
                AuditAction::TaskComplete,
                format!("task {} owned by {}", task.id, task.target_agent),
                "denied",
            );
            return Err(UpliftError::ScopeDenied(format!(
                "task {} is not assigned to {agent}",
                task.id
            )));
        }

        let status = match report.status {
            TaskOutcome::Success => TaskStatus::Completed,
            TaskOutcome::Failure => TaskStatus::Failed,
        };
        self.tasks.finalize(
            task.id,
            status,
            report.output_memory_key.as_deref(),
            report.error.as_deref(),
        )?;
        self.scopes.revoke_task_grants(task.id);

        info!(task_id = %task.id, agent, status = %status, "Task finished");
        self.audit.record(
            agent,
            AuditAction::TaskComplete,
            format!("task {}", task.id),
            status.as_str(),
        );
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::Task(TaskEvent::Finished {
                    task_id: task.id,
                    status,
                }),
            ))
            .await;
        Ok(())
    }

    /// Cancel a pending or running task. Callable by the delegator or an
    /// operator (`actor` is recorded, not authorized here).
    pub async fn cancel(&self, actor: &str, task_id: TaskId) -> UpliftResult<()> {
        self.tasks
            .finalize(task_id, TaskStatus::Cancelled, None, Some("cancelled"))?;
        self.scopes.revoke_task_grants(task_id);
        self.audit.record(
            actor,
            AuditAction::TaskComplete,
            format!("task {task_id}"),
            "cancelled",
        );
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::Task(TaskEvent::Finished {
                    task_id,
                    status: TaskStatus::Cancelled,
                }),
            ))
            .await;
        Ok(())
    }

    /// List tasks for operators.
    pub fn list_tasks(
        &self,
        agent: Option<&str>,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> UpliftResult<Vec<TaskRecord>> {
        self.tasks.list(agent, status, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uplift_types::agent::AgentManifest;
    use uplift_types::scope::{ScopeGrant, ScopeUri};
    use uplift_types::task::TaskPriority;

    fn manifest(name: &str) -> AgentManifest {
        AgentManifest::from_yaml(&format!(
            "name: {name}\nentrypoint:\n  command: python3\n"
        ))
        .unwrap()
    }

    fn orchestrator() -> Orchestrator {
        let db = uplift_memory::open_in_memory().unwrap();
        let agents = AgentStore::new(db.clone());
        agents.register(AgentId::new(), &manifest("invoice-manager")).unwrap();
        agents.register(AgentId::new(), &manifest("writer-agent")).unwrap();
        let scopes = Arc::new(ScopeGuard::new());
        scopes.register_agent(
            "invoice-manager",
            vec![ScopeGrant {
                scope: "uplift://shared/invoices".parse().unwrap(),
                access: ScopeAccess::ReadWrite,
            }],
        );
        Orchestrator::new(
            agents,
            TaskStore::new(db),
            scopes,
            Arc::new(EventBus::new()),
            Arc::new(AuditLog::new()),
        )
    }

    fn delegation(shared: &[&str]) -> DelegationRequest {
        DelegationRequest {
            target_agent_id: "writer-agent".to_string(),
            objective: "Summarize invoices".to_string(),
            input_data: json!({"quarter": "Q3"}),
            shared_scopes: shared.iter().map(|s| s.parse::<ScopeUri>().unwrap()).collect(),
            priority: TaskPriority::High,
        }
    }

    #[tokio::test]
    async fn delegate_claim_complete_flow() {
        let orch = orchestrator();
        let task_id = orch
            .delegate("invoice-manager", delegation(&["uplift://shared/invoices"]))
            .await
            .unwrap();

        // Target sees the task and gains the shared scope
        let ctx = orch.current_task("writer-agent").await.unwrap().unwrap();
        assert_eq!(ctx.task_id, task_id);
        assert_eq!(ctx.source_agent, "invoice-manager");
        assert!(orch
            .scopes
            .check(
                "writer-agent",
                &"uplift://shared/invoices".parse().unwrap(),
                ScopeAccess::Write
            )
            .is_ok());

        // Asking again returns the same running task
        let again = orch.current_task("writer-agent").await.unwrap().unwrap();
        assert_eq!(again.task_id, task_id);

        orch.complete(
            "writer-agent",
            CompletionReport {
                task_id,
                status: TaskOutcome::Success,
                output_memory_key: Some("summary-q3".to_string()),
                error: None,
            },
        )
        .await
        .unwrap();

        // Grant revoked, task terminal
        assert!(orch
            .scopes
            .check(
                "writer-agent",
                &"uplift://shared/invoices".parse().unwrap(),
                ScopeAccess::Read
            )
            .is_err());
        let record = orch.tasks.get(task_id).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.output_memory_key.as_deref(), Some("summary-q3"));
        assert!(orch.audit.verify_integrity().is_ok());
    }

    #[tokio::test]
    async fn cannot_share_unreadable_scopes() {
        let orch = orchestrator();
        let err = orch
            .delegate(
                "invoice-manager",
                delegation(&["uplift://user/financial-prefs"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UpliftError::ScopeDenied(_)));
        assert!(orch.current_task("writer-agent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_target_and_self_delegation_rejected() {
        let orch = orchestrator();
        let mut req = delegation(&[]);
        req.target_agent_id = "nobody".to_string();
        assert!(matches!(
            orch.delegate("invoice-manager", req).await,
            Err(UpliftError::AgentNotFound(_))
        ));

        let mut req = delegation(&[]);
        req.target_agent_id = "invoice-manager".to_string();
        assert!(matches!(
            orch.delegate("invoice-manager", req).await,
            Err(UpliftError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn completion_is_restricted_to_the_target() {
        let orch = orchestrator();
        let task_id = orch
            .delegate("invoice-manager", delegation(&[]))
            .await
            .unwrap();
        orch.current_task("writer-agent").await.unwrap();

        let err = orch
            .complete(
                "invoice-manager",
                CompletionReport {
                    task_id,
                    status: TaskOutcome::Success,
                    output_memory_key: None,
                    error: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UpliftError::ScopeDenied(_)));
    }

    #[tokio::test]
    async fn cancel_revokes_grants() {
        let orch = orchestrator();
        let task_id = orch
            .delegate("invoice-manager", delegation(&["uplift://shared/invoices"]))
            .await
            .unwrap();
        orch.cancel("operator", task_id).await.unwrap();
        assert_eq!(
            orch.tasks.get(task_id).unwrap().unwrap().status,
            TaskStatus::Cancelled
        );
        assert!(orch
            .scopes
            .check(
                "writer-agent",
                &"uplift://shared/invoices".parse().unwrap(),
                ScopeAccess::Read
            )
            .is_err());
    }
}
