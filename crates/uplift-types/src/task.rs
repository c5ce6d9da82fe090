//! Delegated tasks: the unit of inter-agent orchestration.
//!
//! An agent delegates work by naming a target agent, an objective, and the
//! scopes the target may touch while working. The kernel queues the task,
//! grants the shared scopes for the task's lifetime, and hands the task to
//! the target when it asks for work.

use crate::scope::ScopeUri;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a delegated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new random TaskId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority of a delegated task. Higher runs first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// Numeric rank used for queue ordering. Higher claims first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse from the stored lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Lifecycle state of a delegated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, not yet claimed by the target.
    Pending,
    /// Claimed by the target agent.
    Running,
    /// Target reported success.
    Completed,
    /// Target reported failure.
    Failed,
    /// Withdrawn before completion.
    Cancelled,
}

impl TaskStatus {
    /// Canonical lowercase name, as stored and served.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the stored lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the task has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delegation request as received from the delegating agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    /// Name of the agent that should perform the work.
    pub target_agent_id: String,
    /// What the target should do.
    pub objective: String,
    /// Structured input for the target.
    #[serde(default)]
    pub input_data: serde_json::Value,
    /// Scopes to grant the target for the task's lifetime. The delegator
    /// must itself hold read access on each of these.
    #[serde(default)]
    pub shared_scopes: Vec<ScopeUri>,
    /// Queue priority.
    #[serde(default)]
    pub priority: TaskPriority,
}

/// A persisted task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    /// Name of the delegating agent.
    pub source_agent: String,
    /// Name of the target agent.
    pub target_agent: String,
    pub objective: String,
    pub input_data: serde_json::Value,
    pub shared_scopes: Vec<ScopeUri>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Memory key (in a shared scope) where the target left its output.
    pub output_memory_key: Option<String>,
    /// Failure detail when status is `failed`.
    pub error: Option<String>,
}

/// What a target agent sees when it asks for its current task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: TaskId,
    /// Name of the delegating agent.
    pub source_agent: String,
    pub objective: String,
    pub input_data: serde_json::Value,
    pub shared_scopes: Vec<ScopeUri>,
    pub priority: TaskPriority,
}

impl From<&TaskRecord> for TaskContext {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id,
            source_agent: record.source_agent.clone(),
            objective: record.objective.clone(),
            input_data: record.input_data.clone(),
            shared_scopes: record.shared_scopes.clone(),
            priority: record.priority,
        }
    }
}

/// Outcome reported by the target agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failure,
}

/// A completion report from the target agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReport {
    pub task_id: TaskId,
    pub status: TaskOutcome,
    /// Where the output was stored, if anywhere.
    #[serde(default)]
    pub output_memory_key: Option<String>,
    /// Failure detail when status is `failure`.
    #[serde(default)]
    pub error: Option<String>,
}
