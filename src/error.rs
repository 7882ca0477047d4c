//! Error types for QuantaLista.

use thiserror::Error;

use crate::agent::AgentId;
use crate::task::{TaskId, TaskStatus};

/// QuantaLista error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Task was never submitted
    #[error("task not found: {id}")]
    TaskNotFound { id: TaskId },

    /// Task id already known to the scheduler
    #[error("task already submitted: {id}")]
    DuplicateTask { id: TaskId },

    /// Task exists but is not currently in progress
    #[error("task {id} is not in progress (status: {status:?})")]
    TaskNotInProgress { id: TaskId, status: TaskStatus },

    /// Invalid task state transition
    #[error("invalid state transition for task {id}: {from:?} -> {to:?}")]
    InvalidStateTransition { id: TaskId, from: TaskStatus, to: TaskStatus },

    /// Dependency names a task that has not been submitted (strict mode only)
    #[error("task {id} depends on unknown task {dependency}")]
    UnknownDependency { id: TaskId, dependency: TaskId },

    /// Agent was never registered
    #[error("agent not found: {id}")]
    AgentNotFound { id: AgentId },

    /// Agent id already registered
    #[error("agent already registered: {id}")]
    DuplicateAgent { id: AgentId },

    /// Record failed validation at the boundary
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for QuantaLista.
pub type Result<T> = std::result::Result<T, Error>;
