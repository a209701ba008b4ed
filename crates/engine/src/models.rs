//! Core domain models for the pipeline engine.
//!
//! A [`TaskNode`] is only constructible with configuration that fits its
//! kind, so everything downstream of construction (graph building,
//! execution) can rely on it.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use operators::{OperatorKind, TaskConfig};

use crate::{
    retry::{Backoff, RetryPolicy},
    EngineError,
};

// ---------------------------------------------------------------------------
// RetrySettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Partial retry configuration; unset fields fall back to the policy it is
/// applied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffKind>,
    /// Cap for exponential backoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_delay_secs: Option<u64>,
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("'max_attempts' must be at least 1".to_string());
        }
        Ok(())
    }

    /// Overlay these settings on `base`.
    pub fn apply(&self, base: &RetryPolicy) -> RetryPolicy {
        let (base_delay, base_max) = match base.backoff {
            Backoff::Fixed(delay) => (delay, delay),
            Backoff::Exponential { base, max } => (base, max),
        };
        let delay = self
            .retry_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(base_delay);

        let kind = self.backoff.unwrap_or(match base.backoff {
            Backoff::Fixed(_) => BackoffKind::Fixed,
            Backoff::Exponential { .. } => BackoffKind::Exponential,
        });
        let backoff = match kind {
            BackoffKind::Fixed => Backoff::Fixed(delay),
            BackoffKind::Exponential => Backoff::Exponential {
                base: delay,
                max: self
                    .max_retry_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(base_max.max(delay)),
            },
        };

        let mut policy = base.clone();
        policy.max_attempts = self.max_attempts.unwrap_or(base.max_attempts);
        policy.backoff = backoff;
        policy
    }
}

// ---------------------------------------------------------------------------
// TaskNode
// ---------------------------------------------------------------------------

/// A single unit of work in the pipeline graph.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    /// Unique identifier within the graph (referenced by `upstream` lists).
    pub id: String,
    /// Validated, kind-specific configuration.
    pub config: TaskConfig,
    /// Tasks that must succeed before this one starts, without duplicates.
    pub upstream: Vec<String>,
    /// Per-task override of the executor's default retry policy.
    pub retry: Option<RetrySettings>,
}

impl TaskNode {
    /// Create a task, checking `config` against `kind`.
    ///
    /// # Errors
    /// [`EngineError::Config`] if the ID is empty or the configuration does
    /// not fit the kind.
    pub fn new(
        id: impl Into<String>,
        kind: OperatorKind,
        config: Value,
        upstream: Vec<String>,
    ) -> Result<Self, EngineError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EngineError::Config {
                task_id: id,
                reason: "task ID must not be empty".into(),
            });
        }

        let config = TaskConfig::parse(kind, config).map_err(|e| EngineError::Config {
            task_id: id.clone(),
            reason: e.to_string(),
        })?;

        let mut seen = HashSet::new();
        let upstream = upstream
            .into_iter()
            .filter(|u| seen.insert(u.clone()))
            .collect();

        Ok(Self {
            id,
            config,
            upstream,
            retry: None,
        })
    }

    /// A task that does nothing; used for begin/end markers.
    pub fn noop(id: impl Into<String>, upstream: &[&str]) -> Result<Self, EngineError> {
        Self::new(
            id,
            OperatorKind::Noop,
            Value::Null,
            upstream.iter().map(|u| u.to_string()).collect(),
        )
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Result<Self, EngineError> {
        retry.validate().map_err(|reason| EngineError::Config {
            task_id: self.id.clone(),
            reason,
        })?;
        self.retry = Some(retry);
        Ok(self)
    }

    pub fn kind(&self) -> OperatorKind {
        self.config.kind()
    }
}
