//! Operator-level error types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by an operator's `execute` method.
///
/// The retry policy uses the variant to decide whether another attempt is
/// worthwhile:
/// - `Operation` / `Timeout` — a collaborator call failed; retry.
/// - `DataQuality`          — the data is wrong; retrying will not fix it,
///   unless every failure is a count query that could not run.
/// - `Config`               — the task can never succeed as configured.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// A warehouse or credentials call failed.
    #[error("operation failed: {0}")]
    Operation(String),

    /// A collaborator call exceeded its time limit.
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    /// One or more post-load checks did not hold.
    ///
    /// `row_counts` holds every count that was obtained, including those of
    /// tables that passed. Tables whose count query errored appear in
    /// `failures` as [`QualityFailureReason::QueryFailed`].
    #[error("data quality check failed: {}", join_failures(.failures))]
    DataQuality {
        failures: Vec<QualityFailure>,
        row_counts: BTreeMap<String, i64>,
    },

    /// The operator was handed configuration it cannot act on.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl NodeError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Operation(_) | Self::Timeout { .. } => true,
            Self::DataQuality { failures, .. } => {
                !failures.is_empty()
                    && failures
                        .iter()
                        .all(|f| matches!(f.reason, QualityFailureReason::QueryFailed { .. }))
            }
            Self::Config(_) => false,
        }
    }
}

/// A single table that failed a data-quality check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityFailure {
    pub table: String,
    pub reason: QualityFailureReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityFailureReason {
    /// The count query returned no rows (or no usable column).
    NoResults,
    /// The table holds fewer rows than required.
    TooFewRows { found: i64, expected: i64 },
    /// The count query itself failed.
    QueryFailed { error: String },
}

impl fmt::Display for QualityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            QualityFailureReason::NoResults => write!(f, "{} returned no results", self.table),
            QualityFailureReason::TooFewRows { found, expected } => write!(
                f,
                "{} contained {} rows (expected at least {})",
                self.table, found, expected
            ),
            QualityFailureReason::QueryFailed { error } => {
                write!(f, "{} could not be counted: {}", self.table, error)
            }
        }
    }
}

fn join_failures(failures: &[QualityFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by a [`WarehouseClient`](crate::WarehouseClient).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Statement(String),
}

/// Errors surfaced by a [`CredentialsProvider`](crate::CredentialsProvider).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("no credentials found for '{0}'")]
    NotFound(String),

    #[error("credentials '{id}' are unusable: {reason}")]
    Invalid { id: String, reason: String },
}

impl From<WarehouseError> for NodeError {
    fn from(err: WarehouseError) -> Self {
        NodeError::Operation(err.to_string())
    }
}

impl From<CredentialsError> for NodeError {
    fn from(err: CredentialsError) -> Self {
        NodeError::Operation(err.to_string())
    }
}

/// A task configuration did not match its declared kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidConfig(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_collaborator_failures_are_retryable() {
        assert!(NodeError::Operation("boom".into()).is_retryable());
        assert!(NodeError::Timeout {
            what: "COPY staging_events".into(),
            after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!NodeError::Config("missing table".into()).is_retryable());
        assert!(!NodeError::DataQuality {
            failures: vec![],
            row_counts: BTreeMap::new()
        }
        .is_retryable());
    }

    #[test]
    fn data_quality_is_retryable_only_when_every_failure_is_a_query_error() {
        let query_failed = QualityFailure {
            table: "songs".into(),
            reason: QualityFailureReason::QueryFailed {
                error: "statement failed: COUNT songs rejected".into(),
            },
        };
        let too_few = QualityFailure {
            table: "songplays".into(),
            reason: QualityFailureReason::TooFewRows { found: 0, expected: 1 },
        };

        let only_queries = NodeError::DataQuality {
            failures: vec![query_failed.clone()],
            row_counts: BTreeMap::new(),
        };
        assert!(only_queries.is_retryable());
        assert_eq!(
            only_queries.to_string(),
            "data quality check failed: songs could not be counted: \
             statement failed: COUNT songs rejected"
        );

        let mixed = NodeError::DataQuality {
            failures: vec![too_few, query_failed],
            row_counts: BTreeMap::new(),
        };
        assert!(!mixed.is_retryable());
    }

    #[test]
    fn data_quality_message_names_every_failing_table() {
        let err = NodeError::DataQuality {
            failures: vec![
                QualityFailure {
                    table: "songplays".into(),
                    reason: QualityFailureReason::TooFewRows { found: 0, expected: 1 },
                },
                QualityFailure {
                    table: "times".into(),
                    reason: QualityFailureReason::NoResults,
                },
            ],
            row_counts: BTreeMap::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("songplays contained 0 rows (expected at least 1)"));
        assert!(msg.contains("times returned no results"));
    }
}
