//! Per-attempt reporting.
//!
//! Sinks are fire-and-forget: an error (or panic) inside a sink is logged
//! and otherwise ignored, so it can never fail a task.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use tracing::{info, warn};

/// One attempt at running a task's operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptEvent {
    pub task_id: String,
    /// 1-based.
    pub attempt: u32,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { error: String, will_retry: bool },
}

pub trait ObservabilitySink: Send + Sync {
    fn record(&self, event: &AttemptEvent) -> anyhow::Result<()>;
}

/// Writes every attempt to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, event: &AttemptEvent) -> anyhow::Result<()> {
        match &event.outcome {
            AttemptOutcome::Succeeded => info!(
                task_id = %event.task_id,
                attempt = event.attempt,
                duration_ms = event.duration_ms,
                "attempt succeeded"
            ),
            AttemptOutcome::Failed { error, will_retry } => warn!(
                task_id = %event.task_id,
                attempt = event.attempt,
                duration_ms = event.duration_ms,
                will_retry,
                "attempt failed: {error}"
            ),
        }
        Ok(())
    }
}

pub(crate) fn report(sink: &dyn ObservabilitySink, event: &AttemptEvent) {
    match catch_unwind(AssertUnwindSafe(|| sink.record(event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(task_id = %event.task_id, "observability sink failed: {err:#}"),
        Err(_) => warn!(task_id = %event.task_id, "observability sink panicked"),
    }
}
