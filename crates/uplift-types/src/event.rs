//! Event types for the UPLIFT internal event bus.
//!
//! Lifecycle, task, and approval activity flows through events so that
//! supervising components (and subscribed agents) can react without
//! polling the stores.

use crate::agent::AgentId;
use crate::approval::ApprovalStatus;
use crate::task::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new random EventId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an event is directed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTarget {
    /// Deliver to a specific agent.
    Agent(AgentId),
    /// Deliver to all agents.
    Broadcast,
    /// Deliver to the kernel/system.
    System,
}

/// The payload of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    /// Agent lifecycle change.
    Lifecycle(LifecycleEvent),
    /// Delegated task activity.
    Task(TaskEvent),
    /// Approval request activity.
    Approval(ApprovalEvent),
    /// System-level event.
    System(SystemEvent),
}

/// Agent lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    /// An agent process was spawned.
    Spawned {
        agent_id: AgentId,
        name: String,
        pid: u32,
    },
    /// An agent process exited cleanly or was stopped.
    Stopped { agent_id: AgentId, name: String },
    /// An agent process exited abnormally.
    Crashed {
        agent_id: AgentId,
        name: String,
        error: String,
    },
    /// An agent was restarted after a crash.
    Restarted {
        agent_id: AgentId,
        name: String,
        attempt: u32,
    },
    /// An agent exhausted its restart budget.
    Failed { agent_id: AgentId, name: String },
}

/// Delegated task event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TaskEvent {
    /// A task was queued for a target agent.
    Delegated {
        task_id: TaskId,
        source: String,
        target: String,
    },
    /// A task was claimed by its target.
    Claimed { task_id: TaskId, target: String },
    /// A task reached a terminal state.
    Finished {
        task_id: TaskId,
        status: TaskStatus,
    },
}

/// Approval request event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ApprovalEvent {
    /// A request was created and awaits a decision.
    Requested {
        request_id: String,
        agent: String,
        action: String,
    },
    /// A request reached a decision (or expired).
    Decided {
        request_id: String,
        status: ApprovalStatus,
    },
}

/// System-level event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SystemEvent {
    /// The kernel has started.
    KernelStarted,
    /// The kernel is stopping.
    KernelStopping,
    /// The kill switch was thrown: every agent is being terminated.
    EmergencyStop { reason: String },
    /// A health sweep ran.
    HealthCheck { running: usize, failed: usize },
}

/// A complete event in the UPLIFT event system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID.
    pub id: EventId,
    /// Which agent (or the kernel id) produced this event.
    pub source: AgentId,
    /// Where this event is directed.
    pub target: EventTarget,
    /// The event payload.
    pub payload: EventPayload,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event with the given source, target, and payload.
    pub fn new(source: AgentId, target: EventTarget, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            source,
            target,
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_creation() {
        let source = AgentId::new();
        let event = Event::new(
            source,
            EventTarget::Broadcast,
            EventPayload::System(SystemEvent::KernelStarted),
        );
        assert_eq!(event.source, source);
    }

    #[test]
    fn event_serialization() {
        let event = Event::new(
            AgentId::new(),
            EventTarget::System,
            EventPayload::Task(TaskEvent::Finished {
                task_id: TaskId::new(),
                status: TaskStatus::Completed,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
    }
}
