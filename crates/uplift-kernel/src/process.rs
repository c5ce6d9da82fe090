//! Agent process lifecycle: spawn with injected credentials, health
//! sweeps with restart budgets, graceful stop, and the kill switch.

use crate::audit::{AuditAction, AuditLog};
use crate::event_bus::EventBus;
use crate::sessions::SessionManager;
use crate::supervisor::Supervisor;
use crate::{ENV_API_URL, ENV_SESSION_TOKEN};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uplift_memory::agents::{AgentEntry, AgentStore};
use uplift_types::agent::{AgentId, AgentStatus};
use uplift_types::config::SupervisionConfig;
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::event::{Event, EventPayload, EventTarget, LifecycleEvent, SystemEvent};

struct ManagedProcess {
    child: Child,
    agent_id: AgentId,
    pid: u32,
}

/// Spawns and supervises agent processes.
pub struct ProcessManager {
    agents: AgentStore,
    supervisor: Arc<Supervisor>,
    sessions: Arc<SessionManager>,
    bus: Arc<EventBus>,
    audit: Arc<AuditLog>,
    config: SupervisionConfig,
    /// Base URL agents call back into, injected as UPLIFT_API_URL.
    api_url: String,
    processes: Mutex<HashMap<String, ManagedProcess>>,
}

impl ProcessManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: AgentStore,
        supervisor: Arc<Supervisor>,
        sessions: Arc<SessionManager>,
        bus: Arc<EventBus>,
        audit: Arc<AuditLog>,
        config: SupervisionConfig,
        api_url: String,
    ) -> Self {
        Self {
            agents,
            supervisor,
            sessions,
            bus,
            audit,
            config,
            api_url,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Start a registered agent. A manual start resets its restart budget.
    pub async fn start(&self, name: &str) -> UpliftResult<u32> {
        if self.supervisor.is_shutting_down() {
            return Err(UpliftError::ShuttingDown);
        }
        let entry = self
            .agents
            .get(name)?
            .ok_or_else(|| UpliftError::AgentNotFound(name.to_string()))?;

        let mut processes = self.processes.lock().await;
        if processes.contains_key(name) {
            return Err(UpliftError::InvalidState {
                current: "running".to_string(),
                operation: "start".to_string(),
            });
        }
        self.supervisor.reset_agent_restarts(name);
        let pid = self.spawn_locked(&mut processes, &entry).await?;
        Ok(pid)
    }

    /// Spawn the process for `entry` and record it. Caller holds the map lock.
    async fn spawn_locked(
        &self,
        processes: &mut HashMap<String, ManagedProcess>,
        entry: &AgentEntry,
    ) -> UpliftResult<u32> {
        let name = &entry.manifest.name;
        self.agents.set_status(name, AgentStatus::Starting, None)?;

        let token = self.sessions.issue(name);
        let mut command = Command::new(&entry.manifest.entrypoint.command);
        command
            .args(&entry.manifest.entrypoint.args)
            .env(ENV_API_URL, &self.api_url)
            .env(ENV_SESSION_TOKEN, token)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &entry.manifest.entrypoint.working_dir {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(agent = %name, error = %e, "Failed to spawn agent process");
                self.agents.set_status(name, AgentStatus::Failed, None)?;
                self.audit
                    .record(name, AuditAction::AgentSpawn, e.to_string(), "failed");
                return Err(UpliftError::Io(e));
            }
        };
        let pid = child.id().unwrap_or(0);

        self.agents.set_status(name, AgentStatus::Running, Some(pid))?;
        processes.insert(
            name.clone(),
            ManagedProcess {
                child,
                agent_id: entry.id,
                pid,
            },
        );

        info!(agent = %name, pid, "Agent process started");
        self.audit
            .record(name, AuditAction::AgentSpawn, format!("pid {pid}"), "ok");
        self.bus
            .publish(Event::new(
                entry.id,
                EventTarget::System,
                EventPayload::Lifecycle(LifecycleEvent::Spawned {
                    agent_id: entry.id,
                    name: name.clone(),
                    pid,
                }),
            ))
            .await;
        Ok(pid)
    }

    /// Stop a running agent. Graceful stop sends SIGTERM and escalates to
    /// SIGKILL after the configured grace period; `force` kills immediately.
    pub async fn stop(&self, name: &str, force: bool) -> UpliftResult<()> {
        let mut processes = self.processes.lock().await;
        let Some(mut managed) = processes.remove(name) else {
            return Err(UpliftError::InvalidState {
                current: "stopped".to_string(),
                operation: "stop".to_string(),
            });
        };
        drop(processes);

        self.agents
            .set_status(name, AgentStatus::Stopping, Some(managed.pid))?;
        self.terminate(name, &mut managed, force).await;
        self.agents.set_status(name, AgentStatus::Stopped, None)?;

        self.audit.record(
            name,
            AuditAction::AgentStop,
            format!("pid {}", managed.pid),
            if force { "killed" } else { "ok" },
        );
        self.bus
            .publish(Event::new(
                managed.agent_id,
                EventTarget::System,
                EventPayload::Lifecycle(LifecycleEvent::Stopped {
                    agent_id: managed.agent_id,
                    name: name.to_string(),
                }),
            ))
            .await;
        Ok(())
    }

    async fn terminate(&self, name: &str, managed: &mut ManagedProcess, force: bool) {
        if !force {
            send_sigterm(managed.pid);
            let grace = std::time::Duration::from_secs(self.config.stop_grace_secs.max(1));
            match tokio::time::timeout(grace, managed.child.wait()).await {
                Ok(_) => {
                    info!(agent = %name, "Agent exited within grace period");
                    return;
                }
                Err(_) => {
                    warn!(agent = %name, "Agent ignored SIGTERM, killing");
                }
            }
        }
        if let Err(e) = managed.child.kill().await {
            warn!(agent = %name, error = %e, "Kill failed (process already gone?)");
        }
    }

    /// Whether the named agent currently has a live process.
    pub async fn is_running(&self, name: &str) -> bool {
        self.processes.lock().await.contains_key(name)
    }

    /// Number of live agent processes.
    pub async fn running_count(&self) -> usize {
        self.processes.lock().await.len()
    }

    /// One health sweep: reap exited processes, restart crashed agents
    /// within their budget, mark the rest failed or stopped.
    pub async fn health_sweep(&self) -> (usize, usize) {
        let mut processes = self.processes.lock().await;

        let mut exited: Vec<(String, bool, String)> = Vec::new();
        for (name, managed) in processes.iter_mut() {
            match managed.child.try_wait() {
                Ok(Some(status)) => {
                    exited.push((name.clone(), status.success(), status.to_string()));
                }
                Ok(None) => {}
                Err(e) => {
                    exited.push((name.clone(), false, e.to_string()));
                }
            }
        }

        let mut failed = 0usize;
        for (name, clean, detail) in exited {
            let Some(managed) = processes.remove(&name) else {
                continue;
            };
            let agent_id = managed.agent_id;

            if clean {
                info!(agent = %name, "Agent exited cleanly");
                let _ = self.agents.set_status(&name, AgentStatus::Stopped, None);
                self.bus
                    .publish(Event::new(
                        agent_id,
                        EventTarget::System,
                        EventPayload::Lifecycle(LifecycleEvent::Stopped {
                            agent_id,
                            name: name.clone(),
                        }),
                    ))
                    .await;
                continue;
            }

            warn!(agent = %name, detail = %detail, "Agent exited abnormally");
            self.supervisor.record_crash(&name);
            self.bus
                .publish(Event::new(
                    agent_id,
                    EventTarget::System,
                    EventPayload::Lifecycle(LifecycleEvent::Crashed {
                        agent_id,
                        name: name.clone(),
                        error: detail.clone(),
                    }),
                ))
                .await;

            let entry = match self.agents.get(&name) {
                Ok(Some(entry)) => entry,
                _ => continue,
            };
            let restart = self.config.restart_on_failure
                && entry.manifest.restart.on_failure
                && !self.supervisor.is_shutting_down();
            if !restart {
                failed += 1;
                let _ = self.agents.set_status(&name, AgentStatus::Failed, None);
                continue;
            }

            match self
                .supervisor
                .record_agent_restart(&name, entry.manifest.restart.max_attempts)
            {
                Ok(attempt) => {
                    let _ = self.agents.bump_restart_count(&name);
                    match self.spawn_locked(&mut processes, &entry).await {
                        Ok(_) => {
                            self.audit.record(
                                &name,
                                AuditAction::AgentRestart,
                                format!("attempt {attempt}"),
                                "ok",
                            );
                            self.bus
                                .publish(Event::new(
                                    agent_id,
                                    EventTarget::System,
                                    EventPayload::Lifecycle(LifecycleEvent::Restarted {
                                        agent_id,
                                        name: name.clone(),
                                        attempt,
                                    }),
                                ))
                                .await;
                        }
                        Err(e) => {
                            error!(agent = %name, error = %e, "Restart failed");
                            failed += 1;
                        }
                    }
                }
                Err(attempts) => {
                    error!(agent = %name, attempts, "Restart budget exhausted");
                    failed += 1;
                    let _ = self.agents.set_status(&name, AgentStatus::Failed, None);
                    self.audit.record(
                        &name,
                        AuditAction::AgentRestart,
                        format!("attempt {attempts}"),
                        "budget exhausted",
                    );
                    self.bus
                        .publish(Event::new(
                            agent_id,
                            EventTarget::System,
                            EventPayload::Lifecycle(LifecycleEvent::Failed {
                                agent_id,
                                name: name.clone(),
                            }),
                        ))
                        .await;
                }
            }
        }

        (processes.len(), failed)
    }

    /// Run the health sweep until shutdown.
    pub async fn run_health_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let period = std::time::Duration::from_secs(self.config.health_check_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (running, failed) = self.health_sweep().await;
                    self.bus
                        .publish(Event::new(
                            AgentId::new(),
                            EventTarget::System,
                            EventPayload::System(SystemEvent::HealthCheck { running, failed }),
                        ))
                        .await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// The kill switch: terminate every agent process immediately.
    pub async fn emergency_stop(&self, reason: &str) -> usize {
        warn!(reason, "EMERGENCY STOP: killing all agent processes");
        let mut processes = self.processes.lock().await;
        let count = processes.len();
        for (name, mut managed) in processes.drain() {
            if let Err(e) = managed.child.kill().await {
                warn!(agent = %name, error = %e, "Kill failed during emergency stop");
            }
            let _ = self.agents.set_status(&name, AgentStatus::Stopped, None);
        }
        drop(processes);

        self.audit
            .record("system", AuditAction::EmergencyStop, reason, "ok");
        self.bus
            .publish(Event::new(
                AgentId::new(),
                EventTarget::Broadcast,
                EventPayload::System(SystemEvent::EmergencyStop {
                    reason: reason.to_string(),
                }),
            ))
            .await;
        count
    }

    /// Gracefully stop every agent, used on daemon shutdown.
    pub async fn shutdown_all(&self) {
        let names: Vec<String> = {
            let processes = self.processes.lock().await;
            processes.keys().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.stop(&name, false).await {
                warn!(agent = %name, error = %e, "Stop during shutdown failed");
            }
        }
    }
}

/// Best-effort SIGTERM. On non-unix platforms graceful stop degrades to
/// the grace-period wait followed by a hard kill.
fn send_sigterm(pid: u32) {
    #[cfg(unix)]
    {
        let _ = std::process::Command::new("kill")
            .arg(pid.to_string())
            .status();
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}
