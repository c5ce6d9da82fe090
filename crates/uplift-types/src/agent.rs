//! Agent identity, lifecycle status, and manifests.

use crate::scope::ScopeGrant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for an agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new random AgentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a supervised agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered but not running.
    Stopped,
    /// Process spawned, not yet confirmed healthy.
    Starting,
    /// Process alive.
    Running,
    /// Stop requested, waiting for exit.
    Stopping,
    /// Exceeded its restart budget or failed to spawn.
    Failed,
}

impl AgentStatus {
    /// Canonical lowercase name, as stored and served.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = crate::error::UpliftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "failed" => Ok(Self::Failed),
            other => Err(crate::error::UpliftError::InvalidInput(format!(
                "unknown agent status '{other}'"
            ))),
        }
    }
}

/// How the agent process is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrypoint {
    /// The program to execute.
    pub command: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; defaults to the manifest's directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Restart policy for a supervised agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Restart the process when it exits with a failure.
    #[serde(default = "default_true")]
    pub on_failure: bool,
    /// Maximum restart attempts before the agent is marked failed.
    /// 0 means unlimited.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            on_failure: true,
            max_attempts: default_max_attempts(),
        }
    }
}

/// An agent manifest, loaded from `agent.yaml`.
///
/// ```yaml
/// name: research-agent
/// version: 0.1.0
/// description: Gathers sources for the writer agent
/// entrypoint:
///   command: python3
///   args: ["agent.py"]
/// priority: 5
/// scopes:
///   - scope: uplift://user/research-prefs
///     access: read
/// restart:
///   on_failure: true
///   max_attempts: 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentManifest {
    /// Unique agent name, also the name of its private scope.
    pub name: String,
    /// Manifest version string.
    #[serde(default = "default_version")]
    pub version: String,
    /// Human-readable description, shown in the agent directory.
    #[serde(default)]
    pub description: String,
    /// How to launch the agent process.
    pub entrypoint: Entrypoint,
    /// Scheduling priority, 1 (lowest) to 10 (highest).
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Memory scopes the agent requests beyond its private scope.
    #[serde(default)]
    pub scopes: Vec<ScopeGrant>,
    /// Restart policy.
    #[serde(default)]
    pub restart: RestartPolicy,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_priority() -> u8 {
    5
}

impl AgentManifest {
    /// Parse a manifest from YAML, validating the name and priority.
    pub fn from_yaml(yaml: &str) -> crate::error::UpliftResult<Self> {
        let manifest: Self = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate manifest fields that serde cannot express.
    pub fn validate(&self) -> crate::error::UpliftResult<()> {
        if self.name.is_empty()
            || !self
                .name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        {
            return Err(crate::error::UpliftError::ManifestParse(format!(
                "agent name '{}' must be non-empty [a-z0-9_-]",
                self.name
            )));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(crate::error::UpliftError::ManifestParse(format!(
                "priority {} out of range 1..=10",
                self.priority
            )));
        }
        if self.entrypoint.command.is_empty() {
            return Err(crate::error::UpliftError::ManifestParse(
                "entrypoint.command is empty".to_string(),
            ));
        }
        Ok(())
    }
}
