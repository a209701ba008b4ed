//! Engine-level error types.

use thiserror::Error;

use operators::NodeError;

/// Errors produced while building a pipeline graph.
///
/// All of these are fatal: a run never starts from an invalid graph.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Definition errors ------

    /// A task's configuration does not fit its declared kind.
    #[error("task '{task_id}' has invalid configuration: {reason}")]
    Config { task_id: String, reason: String },

    /// The pipeline definition could not be read or parsed.
    #[error("invalid pipeline definition: {0}")]
    Definition(String),

    #[error("cannot read pipeline definition: {0}")]
    Io(#[from] std::io::Error),

    // ------ Topology errors ------

    /// Two or more tasks share the same ID.
    #[error("duplicate task ID: '{0}'")]
    DuplicateNode(String),

    /// A task lists an upstream that does not exist.
    #[error("task '{task_id}' depends on unknown task '{upstream}'")]
    DanglingEdge { task_id: String, upstream: String },

    /// Topological sort could not order these tasks.
    #[error("task graph contains a cycle through: {}", .tasks.join(", "))]
    Cycle { tasks: Vec<String> },
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Definition(err.to_string())
    }
}

/// A task's operation failed for good, either after exhausting its attempts
/// or on a failure that is not worth retrying.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("failed after {attempts} attempt(s): {last}")]
pub struct RetryError {
    pub attempts: u32,
    pub last: NodeError,
}
