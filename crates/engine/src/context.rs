//! Per-run state: one [`TaskResult`] per task plus the overall status.
//!
//! A `RunContext` is created when a run starts, written only by the
//! executor loop (once per state transition), and handed back to the caller
//! when the run is over.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use operators::{OperatorKind, TaskOutput};

use crate::dag::Graph;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed  => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed  => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskResult
// ---------------------------------------------------------------------------

/// Outcome of one task within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub kind: OperatorKind,
    pub status: TaskStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last error message; for skipped tasks, why they were skipped.
    pub error: Option<String>,
    pub rows_affected: Option<u64>,
    /// Row counts from data-quality checks, kept on failure too.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub row_counts: BTreeMap<String, i64>,
}

impl TaskResult {
    fn pending(task_id: String, kind: OperatorKind) -> Self {
        Self {
            task_id,
            kind,
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            error: None,
            rows_affected: None,
            row_counts: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Counts of task results by terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Cancellation was requested while the run was in progress.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// In the graph's execution order.
    tasks: Vec<TaskResult>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl RunContext {
    /// Fresh context with every task of `graph` pending.
    pub fn new(run_id: Uuid, graph: &Graph, now: DateTime<Utc>) -> Self {
        let tasks: Vec<TaskResult> = graph
            .order()
            .iter()
            .filter_map(|id| graph.node(id))
            .map(|node| TaskResult::pending(node.id.clone(), node.kind()))
            .collect();
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.task_id.clone(), i))
            .collect();

        Self {
            run_id,
            status: RunStatus::Running,
            cancelled: false,
            started_at: now,
            finished_at: None,
            tasks,
            index,
        }
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.index.get(task_id).map(|&i| &self.tasks[i])
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.get(task_id).map(|t| t.status)
    }

    /// All task results in execution order.
    pub fn tasks(&self) -> &[TaskResult] {
        &self.tasks
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.tasks.len(),
            ..RunSummary::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Success => summary.succeeded += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Pending | TaskStatus::Running => {}
            }
        }
        summary
    }

    pub(crate) fn mark_running(&mut self, task_id: &str, now: DateTime<Utc>) {
        if let Some(task) = self.entry(task_id, TaskStatus::Pending) {
            task.status = TaskStatus::Running;
            task.started_at = Some(now);
        }
    }

    pub(crate) fn mark_success(
        &mut self,
        task_id: &str,
        now: DateTime<Utc>,
        attempts: u32,
        output: TaskOutput,
    ) {
        if let Some(task) = self.entry(task_id, TaskStatus::Running) {
            task.status = TaskStatus::Success;
            task.finished_at = Some(now);
            task.attempts = attempts;
            task.rows_affected = output.rows_affected;
            task.row_counts = output.row_counts;
        }
    }

    pub(crate) fn mark_failed(
        &mut self,
        task_id: &str,
        now: DateTime<Utc>,
        attempts: u32,
        error: String,
        row_counts: BTreeMap<String, i64>,
    ) {
        if let Some(task) = self.entry(task_id, TaskStatus::Running) {
            task.status = TaskStatus::Failed;
            task.finished_at = Some(now);
            task.attempts = attempts;
            task.error = Some(error);
            task.row_counts = row_counts;
        }
    }

    pub(crate) fn mark_skipped(&mut self, task_id: &str, now: DateTime<Utc>, reason: String) {
        if let Some(task) = self.entry(task_id, TaskStatus::Pending) {
            task.status = TaskStatus::Skipped;
            task.finished_at = Some(now);
            task.error = Some(reason);
        }
    }

    /// Settle the overall status: success only if every task succeeded.
    pub(crate) fn finish(&mut self, now: DateTime<Utc>) {
        let all_succeeded = self
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Success);
        self.status = if all_succeeded && !self.cancelled {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        self.finished_at = Some(now);
    }

    /// The task's result, if it is currently in state `from`.
    fn entry(&mut self, task_id: &str, from: TaskStatus) -> Option<&mut TaskResult> {
        let task = self.index.get(task_id).map(|&i| &mut self.tasks[i])?;
        debug_assert_eq!(task.status, from, "illegal transition for task '{task_id}'");
        (task.status == from).then_some(task)
    }
}
