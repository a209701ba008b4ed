//! JSON pipeline definitions.
//!
//! ```json
//! {
//!   "name": "dag_etl_redshift",
//!   "defaults": { "max_attempts": 4, "retry_delay_secs": 300 },
//!   "tasks": [
//!     { "id": "Begin_execution", "kind": "noop" },
//!     { "id": "Stage_songs", "kind": "stage", "upstream": ["Begin_execution"],
//!       "config": { "table": "staging_songs", "source": "s3://udacity-dend/song_data" } }
//!   ]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use operators::OperatorKind;

use crate::{
    dag::{Graph, GraphBuilder},
    executor::ExecutorConfig,
    models::{BackoffKind, RetrySettings, TaskNode},
    EngineError,
};

/// A whole pipeline as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub defaults: PipelineDefaults,
    pub tasks: Vec<TaskDefinition>,
}

/// Run-wide settings; task-level `retry` blocks override the retry fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_delay_secs: Option<u64>,
    /// Limit for each individual warehouse/credentials call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_tasks: Option<usize>,
}

impl PipelineDefaults {
    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.max_attempts,
            retry_delay_secs: self.retry_delay_secs,
            backoff: self.backoff,
            max_retry_delay_secs: self.max_retry_delay_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDefinition {
    pub id: String,
    pub kind: OperatorKind,
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,
}

impl PipelineDefinition {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Validate every task's configuration and the topology.
    ///
    /// # Errors
    /// The first [`EngineError`] found: bad configuration, duplicate IDs,
    /// unknown upstream references, or a cycle.
    pub fn build_graph(&self) -> Result<Graph, EngineError> {
        let mut builder = GraphBuilder::new();
        for task in &self.tasks {
            let mut node = TaskNode::new(
                task.id.clone(),
                task.kind,
                task.config.clone(),
                task.upstream.clone(),
            )?;
            if let Some(retry) = &task.retry {
                node = node.with_retry(retry.clone())?;
            }
            builder.add_node(node)?;
        }
        builder.build()
    }

    /// Executor settings derived from `defaults`.
    pub fn executor_config(&self) -> Result<ExecutorConfig, EngineError> {
        let settings = self.defaults.retry_settings();
        settings.validate().map_err(|reason| EngineError::Config {
            task_id: "<defaults>".into(),
            reason,
        })?;

        let base = ExecutorConfig::default();
        Ok(ExecutorConfig {
            max_parallel_tasks: self
                .defaults
                .max_parallel_tasks
                .unwrap_or(base.max_parallel_tasks),
            default_retry: settings.apply(&base.default_retry),
        })
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.defaults.call_timeout_secs.map(Duration::from_secs)
    }
}
