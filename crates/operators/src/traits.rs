//! The `Operator` trait — the contract every task behaviour must fulfil.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{collaborators::Collaborators, config::OperatorKind, NodeError};

/// Per-attempt context passed to every operator.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the current pipeline run.
    pub run_id: Uuid,
    /// ID of the task being executed.
    pub task_id: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// What a successful operator run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Rows affected by the statements the operator issued, when known.
    pub rows_affected: Option<u64>,
    /// Per-table row counts (data-quality checks).
    pub row_counts: BTreeMap<String, i64>,
}

impl TaskOutput {
    pub fn affected(rows: u64) -> Self {
        Self {
            rows_affected: Some(rows),
            ..Self::default()
        }
    }
}

/// The core operator trait.
///
/// Operators do not retry internally; the engine wraps `execute` in its
/// retry policy.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Which behaviour this operator implements.
    fn kind(&self) -> OperatorKind;

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError>;
}
