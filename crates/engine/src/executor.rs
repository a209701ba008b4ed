//! Pipeline execution engine.
//!
//! `Executor` is the central orchestrator:
//! 1. Walks the graph's topological order and starts every task whose
//!    upstream tasks all succeeded.
//! 2. Runs ready tasks concurrently, each through its `RetryPolicy`.
//! 3. Skips every task downstream of a failure (transitively); sibling
//!    branches are unaffected and in-flight tasks always run to completion.
//! 4. Stops starting new tasks once the run is cancelled.
//! 5. Records each terminal transition in the `RunContext`.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use operators::{build_operator, Collaborators, ExecutionContext, NodeError, Operator, TaskOutput};

use crate::{
    clock::{Clock, SystemClock},
    context::{RunContext, RunStatus, TaskStatus},
    dag::Graph,
    error::RetryError,
    observability::{ObservabilitySink, TracingSink},
    retry::RetryPolicy,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of tasks running at once (0 = unlimited).
    pub max_parallel_tasks: usize,
    /// Retry policy for tasks that do not override it.
    pub default_retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 0,
            default_retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operator registry
// ---------------------------------------------------------------------------

/// Maps task IDs to the operator that runs them.
pub type OperatorRegistry = HashMap<String, Arc<dyn Operator>>;

/// One operator per task, built from each task's configuration.
pub fn registry_for(graph: &Graph) -> OperatorRegistry {
    graph
        .nodes()
        .map(|node| (node.id.clone(), build_operator(&node.config)))
        .collect()
}

type TaskOutcome = Result<(TaskOutput, u32), RetryError>;

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs a validated graph against a set of collaborators.
///
/// Construct one executor per process (or per run) and call
/// [`Executor::run`] with the graph and its operators.
pub struct Executor {
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ObservabilitySink>,
    config: ExecutorConfig,
}

impl Executor {
    /// Create a new executor using wall-clock time and `tracing` for
    /// per-attempt reporting.
    pub fn new(collaborators: Collaborators, config: ExecutorConfig) -> Self {
        Self {
            collaborators,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run every task of `graph` to a terminal state.
    pub async fn run(&self, graph: &Graph, registry: &OperatorRegistry) -> RunContext {
        self.run_until_cancelled(graph, registry, &CancellationToken::new())
            .await
    }

    /// Like [`Executor::run`], but stops starting tasks once `cancel` fires.
    ///
    /// Tasks already running finish normally; tasks not yet started end up
    /// `Skipped` and the run `Failed`.
    #[instrument(skip_all, fields(tasks = graph.len()))]
    pub async fn run_until_cancelled(
        &self,
        graph: &Graph,
        registry: &OperatorRegistry,
        cancel: &CancellationToken,
    ) -> RunContext {
        let mut ctx = RunContext::new(Uuid::new_v4(), graph, self.clock.now());
        info!(
            run_id = %ctx.run_id,
            "starting run of {} tasks in order: {:?}",
            graph.len(), graph.order()
        );

        let mut in_flight: FuturesUnordered<BoxFuture<'_, (String, TaskOutcome)>> =
            FuturesUnordered::new();

        loop {
            let cancelled = cancel.is_cancelled();
            if cancelled && !ctx.cancelled {
                warn!(run_id = %ctx.run_id, "cancellation requested, no new tasks will start");
                ctx.cancelled = true;
            }

            // ------------------------------------------------------------------
            // Settle skips and start ready tasks. Visiting in topological
            // order propagates skips transitively within a single pass.
            // ------------------------------------------------------------------
            for task_id in graph.order() {
                if ctx.status_of(task_id) != Some(TaskStatus::Pending) {
                    continue;
                }
                let upstream = graph.upstream_of(task_id);

                let blocker = upstream.iter().find(|u| {
                    matches!(
                        ctx.status_of(u),
                        Some(TaskStatus::Failed) | Some(TaskStatus::Skipped)
                    )
                });
                if let Some(blocker) = blocker {
                    let reason = format!("upstream task '{blocker}' did not succeed");
                    info!(task_id = %task_id, "skipping: {reason}");
                    ctx.mark_skipped(task_id, self.clock.now(), reason);
                    continue;
                }

                if cancelled {
                    ctx.mark_skipped(
                        task_id,
                        self.clock.now(),
                        "run cancelled before task started".to_string(),
                    );
                    continue;
                }

                let ready = upstream
                    .iter()
                    .all(|u| ctx.status_of(u) == Some(TaskStatus::Success));
                let at_capacity = self.config.max_parallel_tasks > 0
                    && in_flight.len() >= self.config.max_parallel_tasks;
                if !ready || at_capacity {
                    continue;
                }

                info!(task_id = %task_id, "starting task");
                ctx.mark_running(task_id, self.clock.now());
                in_flight.push(self.run_task(graph, registry, task_id, ctx.run_id).boxed());
            }

            if in_flight.is_empty() {
                break;
            }

            // ------------------------------------------------------------------
            // Wait for the next task to finish (or for cancellation).
            // ------------------------------------------------------------------
            tokio::select! {
                Some((task_id, outcome)) = in_flight.next() => {
                    self.record(&mut ctx, &task_id, outcome);
                }
                _ = cancel.cancelled(), if !cancelled => {}
                else => {}
            }
        }

        ctx.finish(self.clock.now());
        let summary = ctx.summary();
        match ctx.status {
            RunStatus::Success => info!(
                run_id = %ctx.run_id,
                "run succeeded: {} of {} tasks", summary.succeeded, summary.total
            ),
            _ => error!(
                run_id = %ctx.run_id,
                "run failed: {} succeeded, {} failed, {} skipped",
                summary.succeeded, summary.failed, summary.skipped
            ),
        }
        ctx
    }

    // -----------------------------------------------------------------------
    // Internal: run one task through its retry policy.
    // -----------------------------------------------------------------------

    async fn run_task<'a>(
        &'a self,
        graph: &'a Graph,
        registry: &'a OperatorRegistry,
        task_id: &'a str,
        run_id: Uuid,
    ) -> (String, TaskOutcome) {
        let Some(operator) = registry.get(task_id) else {
            let outcome = Err(RetryError {
                attempts: 0,
                last: NodeError::Config(format!("no operator registered for task '{task_id}'")),
            });
            return (task_id.to_string(), outcome);
        };

        let policy = self.policy_for(graph, task_id);
        let collaborators = &self.collaborators;

        let outcome = policy
            .run(task_id, self.clock.as_ref(), self.sink.as_ref(), |attempt| {
                let ctx = ExecutionContext {
                    run_id,
                    task_id: task_id.to_string(),
                    attempt,
                };
                let operator = Arc::clone(operator);
                async move {
                    AssertUnwindSafe(operator.execute(&ctx, collaborators))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(NodeError::Operation(format!(
                                "operator panicked: {}",
                                panic_message(panic.as_ref())
                            )))
                        })
                }
            })
            .await;

        (task_id.to_string(), outcome)
    }

    fn policy_for(&self, graph: &Graph, task_id: &str) -> RetryPolicy {
        match graph.node(task_id).and_then(|n| n.retry.as_ref()) {
            Some(settings) => settings.apply(&self.config.default_retry),
            None => self.config.default_retry.clone(),
        }
    }

    fn record(&self, ctx: &mut RunContext, task_id: &str, outcome: TaskOutcome) {
        let now = self.clock.now();
        match outcome {
            Ok((output, attempts)) => {
                info!(task_id = %task_id, attempts, "task succeeded");
                ctx.mark_success(task_id, now, attempts, output);
            }
            Err(err) => {
                error!(task_id = %task_id, "task failed: {err}");
                let row_counts = match &err.last {
                    NodeError::DataQuality { row_counts, .. } => row_counts.clone(),
                    _ => Default::default(),
                };
                ctx.mark_failed(task_id, now, err.attempts, err.last.to_string(), row_counts);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
