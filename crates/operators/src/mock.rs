//! Test doubles for the collaborator traits and for `Operator`.
//!
//! Useful in unit and integration tests where a real warehouse is either
//! unavailable or irrelevant.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    collaborators::{AwsCredentials, Collaborators, CredentialsProvider, WarehouseClient},
    config::OperatorKind,
    error::{CredentialsError, WarehouseError},
    statement::{Row, Statement},
    traits::{ExecutionContext, Operator, TaskOutput},
    NodeError,
};

// ---------------------------------------------------------------------------
// MockWarehouse
// ---------------------------------------------------------------------------

struct FailureRule {
    verb: String,
    table: Option<String>,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Default)]
struct WarehouseState {
    tables: HashMap<String, i64>,
    source_rows: HashMap<String, i64>,
    insert_rows: HashMap<String, i64>,
    empty_results: HashSet<String>,
    failures: Vec<FailureRule>,
    executed: Vec<Statement>,
    queried: Vec<Statement>,
}

impl WarehouseState {
    fn should_fail(&mut self, statement: &Statement) -> bool {
        let table = statement.table();
        for rule in &mut self.failures {
            let matches = rule.verb == statement.verb()
                && rule.table.as_deref().map_or(true, |t| Some(t) == table);
            if !matches {
                continue;
            }
            match &mut rule.remaining {
                None => return true,
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

/// In-memory warehouse that tracks a row count per table.
///
/// - `DELETE` / `TRUNCATE` reset the count to zero.
/// - `COPY` adds the table's configured source rows (default 1).
/// - `INSERT` adds the table's configured insert rows (default 1).
/// - `COUNT` answers with the current count.
///
/// Every statement is recorded, including ones made to fail.
#[derive(Default)]
pub struct MockWarehouse {
    state: Mutex<WarehouseState>,
    latency: Option<Duration>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with `rows` rows.
    pub fn with_table(mut self, table: &str, rows: i64) -> Self {
        self.state_mut().tables.insert(table.to_string(), rows);
        self
    }

    /// Rows a `COPY` into `table` loads.
    pub fn with_source_rows(mut self, table: &str, rows: i64) -> Self {
        self.state_mut().source_rows.insert(table.to_string(), rows);
        self
    }

    /// Rows an `INSERT ... SELECT` into `table` adds.
    pub fn with_insert_rows(mut self, table: &str, rows: i64) -> Self {
        self.state_mut().insert_rows.insert(table.to_string(), rows);
        self
    }

    /// Make `COUNT table` return no rows at all.
    pub fn with_empty_result(mut self, table: &str) -> Self {
        self.state_mut().empty_results.insert(table.to_string());
        self
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Always fail statements with this verb against `table`.
    pub fn fail_on(mut self, verb: &str, table: &str) -> Self {
        self.state_mut().failures.push(FailureRule {
            verb: verb.to_string(),
            table: Some(table.to_string()),
            remaining: None,
        });
        self
    }

    /// Fail the first `times` matching statements, then behave normally.
    pub fn fail_times(mut self, verb: &str, table: &str, times: u32) -> Self {
        self.state_mut().failures.push(FailureRule {
            verb: verb.to_string(),
            table: Some(table.to_string()),
            remaining: Some(times),
        });
        self
    }

    /// All statements passed to `execute`, in call order.
    pub fn executed(&self) -> Vec<Statement> {
        self.state.lock().unwrap().executed.clone()
    }

    /// `execute` calls rendered as `"VERB table"`.
    pub fn executed_verbs(&self) -> Vec<String> {
        self.executed().iter().map(ToString::to_string).collect()
    }

    /// `query` calls rendered as `"VERB table"`.
    pub fn queried_verbs(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .queried
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn row_count(&self, table: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .copied()
            .unwrap_or(0)
    }

    fn state_mut(&mut self) -> &mut WarehouseState {
        self.state.get_mut().unwrap()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl WarehouseClient for MockWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<u64, WarehouseError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.executed.push(statement.clone());

        if state.should_fail(statement) {
            return Err(WarehouseError::Statement(format!("{statement} rejected")));
        }

        let affected = match statement {
            Statement::Raw(_) | Statement::CountRows { .. } => 0,
            Statement::Clear { table } | Statement::Truncate { table } => {
                state.tables.insert(table.clone(), 0).unwrap_or(0)
            }
            Statement::Copy { table, .. } => {
                let rows = state.source_rows.get(table).copied().unwrap_or(1);
                *state.tables.entry(table.clone()).or_insert(0) += rows;
                rows
            }
            Statement::InsertSelect { table, .. } => {
                let rows = state.insert_rows.get(table).copied().unwrap_or(1);
                *state.tables.entry(table.clone()).or_insert(0) += rows;
                rows
            }
        };
        Ok(affected.max(0) as u64)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, WarehouseError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.queried.push(statement.clone());

        if state.should_fail(statement) {
            return Err(WarehouseError::Statement(format!("{statement} rejected")));
        }

        match statement {
            Statement::CountRows { table } if state.empty_results.contains(table) => Ok(vec![]),
            Statement::CountRows { table } => {
                let count = state.tables.get(table).copied().unwrap_or(0);
                Ok(vec![vec![json!(count)]])
            }
            _ => Ok(vec![]),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticCredentials
// ---------------------------------------------------------------------------

/// Fixed credential table.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    entries: HashMap<String, AwsCredentials>,
}

impl StaticCredentials {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(id: &str, access_key: &str, secret_key: &str) -> Self {
        Self::empty().with(id, access_key, secret_key)
    }

    pub fn with(mut self, id: &str, access_key: &str, secret_key: &str) -> Self {
        self.entries
            .insert(id.to_string(), AwsCredentials::new(access_key, secret_key));
        self
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn resolve(&self, credential_id: &str) -> Result<AwsCredentials, CredentialsError> {
        self.entries
            .get(credential_id)
            .cloned()
            .ok_or_else(|| CredentialsError::NotFound(credential_id.to_string()))
    }
}

/// Collaborators backed by a fresh [`MockWarehouse`] and no credentials.
pub fn mock_collaborators() -> Collaborators {
    Collaborators::new(
        Arc::new(MockWarehouse::new()),
        Arc::new(StaticCredentials::empty()),
    )
}

// ---------------------------------------------------------------------------
// MockOperator
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockOperator` at construction time.
pub enum MockBehaviour {
    /// Return the given output.
    Succeed(TaskOutput),
    /// Fail every attempt with this error.
    Fail(NodeError),
    /// Fail the first `times` attempts, then succeed.
    FailTimes { times: u32, error: NodeError },
}

/// An operator that records every call it receives and returns a
/// programmer-specified result.
pub struct MockOperator {
    /// Label used in test assertions.
    pub name: String,
    /// What the operator will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Simulated work time per call.
    pub latency: Option<Duration>,
    /// Attempt numbers seen by this operator (in call order).
    pub calls: Arc<Mutex<Vec<u32>>>,
}

impl MockOperator {
    /// Create a mock that always succeeds with an empty output.
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Succeed(TaskOutput::default()))
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(name: impl Into<String>, error: NodeError) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(error))
    }

    /// Create a mock that fails `times` times with `error`, then succeeds.
    pub fn flaky(name: impl Into<String>, times: u32, error: NodeError) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailTimes { times, error })
    }

    pub fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            latency: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of times this operator has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Operator for MockOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Noop
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        _collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ctx.attempt);
            calls.len() as u32
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match &self.behaviour {
            MockBehaviour::Succeed(output) => Ok(output.clone()),
            MockBehaviour::Fail(error) => Err(error.clone()),
            MockBehaviour::FailTimes { times, error } if call_number <= *times => {
                Err(error.clone())
            }
            MockBehaviour::FailTimes { .. } => Ok(TaskOutput::default()),
        }
    }
}
