//! Error types for the delegated-task registry.

use std::time::Duration;

use crate::tasks::model::TaskStatus;

/// Top-level error type for the registry host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Tool error: {0}")]
    Tool(#[from] crate::tools::ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Registry errors.
///
/// `Display` strings are part of the tool contract: they are returned to the
/// calling agent verbatim in the `error` field of a `success: false` response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),

    #[error("Task {id} not found")]
    NotFound { id: String },

    #[error("Task {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: String,
        state: TaskStatus,
        target: TaskStatus,
    },

    #[error("Task {id} is still {state}; pass force=true to remove it anyway")]
    InvalidState { id: String, state: TaskStatus },

    #[error("Maximum running tasks ({max}) exceeded")]
    CapacityExceeded { max: usize },

    #[error("Dispatcher is shutting down, delegation refused")]
    ShuttingDown,
}

impl TaskError {
    /// Validation error for a request that lacks `task_id`.
    pub fn missing_task_id(operation: &str) -> Self {
        Self::Validation(format!("task_id is required for {operation} operation"))
    }

    /// The task id this error refers to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { id }
            | Self::InvalidTransition { id, .. }
            | Self::InvalidState { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Child agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent {name} not found")]
    NotFound { name: String },

    #[error("Agent {name} failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Agent {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Agent {name} refused the task: {reason}")]
    Refused { name: String, reason: String },
}

/// Failure reported by delegated work.
///
/// Never propagated to the parent agent; the message is stored as the task's
/// `error` field and observed by polling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct WorkError(String);

impl WorkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<AgentError> for WorkError {
    fn from(err: AgentError) -> Self {
        Self(err.to_string())
    }
}

impl From<String> for WorkError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for WorkError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Result type alias for the registry.
pub type Result<T> = std::result::Result<T, Error>;
