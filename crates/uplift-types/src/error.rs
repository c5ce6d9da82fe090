//! Shared error types for the UPLIFT runtime.

use thiserror::Error;

/// Top-level error type for the UPLIFT runtime.
#[derive(Error, Debug)]
pub enum UpliftError {
    /// The requested agent was not found.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// An agent with this name already exists.
    #[error("Agent already exists: {0}")]
    AgentAlreadyExists(String),

    /// A memory scope access check failed.
    #[error("Scope access denied: {0}")]
    ScopeDenied(String),

    /// A memory scope URI could not be parsed.
    #[error("Invalid scope URI: {0}")]
    InvalidScope(String),

    /// The requested task was not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The requested approval request was not found.
    #[error("Approval request not found: {0}")]
    ApprovalNotFound(String),

    /// The target is in an invalid state for the requested operation.
    #[error("Invalid state '{current}' for operation '{operation}'")]
    InvalidState {
        /// The current state of the target.
        current: String,
        /// The operation that was attempted.
        operation: String,
    },

    /// A memory substrate error occurred.
    #[error("Memory error: {0}")]
    Memory(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to parse an agent manifest.
    #[error("Manifest parsing error: {0}")]
    ManifestParse(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Authentication/authorization denied.
    #[error("Auth denied: {0}")]
    AuthDenied(String),

    /// A rate or resource quota was exceeded.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Invalid user input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The kernel is shutting down.
    #[error("Shutdown in progress")]
    ShuttingDown,

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Alias for Result with UpliftError.
pub type UpliftResult<T> = Result<T, UpliftError>;

impl From<serde_json::Error> for UpliftError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for UpliftError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ManifestParse(err.to_string())
    }
}
