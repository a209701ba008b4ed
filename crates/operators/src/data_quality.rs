//! Post-load row-count assertions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::{
    collaborators::Collaborators,
    config::{DataQualityConfig, OperatorKind},
    error::{QualityFailure, QualityFailureReason},
    statement::{Row, Statement},
    traits::{ExecutionContext, Operator, TaskOutput},
    NodeError,
};

#[derive(Debug, Clone)]
pub struct DataQualityOperator {
    config: DataQualityConfig,
}

impl DataQualityOperator {
    pub fn new(config: DataQualityConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Operator for DataQualityOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::DataQuality
    }

    /// Every table is checked even after a failure, so one run reports all
    /// problems.
    ///
    /// Any problem yields [`NodeError::DataQuality`] carrying the counts of
    /// every table that answered. A count query that errors is listed as
    /// [`QualityFailureReason::QueryFailed`]; the error is retryable only
    /// when no table actually violated its rule.
    #[instrument(skip_all, fields(task_id = %ctx.task_id, attempt = ctx.attempt))]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError> {
        let expected = self.config.expected_min_rows;
        let mut row_counts = BTreeMap::new();
        let mut failures = Vec::new();

        for table in &self.config.tables {
            info!(table = %table, "running row count check");
            let rows = match collaborators
                .query(&Statement::CountRows { table: table.clone() })
                .await
            {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(table = %table, error = %err, "row count query failed");
                    let error = match err {
                        NodeError::Operation(msg) => msg,
                        other => other.to_string(),
                    };
                    failures.push(QualityFailure {
                        table: table.clone(),
                        reason: QualityFailureReason::QueryFailed { error },
                    });
                    continue;
                }
            };

            let Some(count) = first_count(&rows) else {
                failures.push(QualityFailure {
                    table: table.clone(),
                    reason: QualityFailureReason::NoResults,
                });
                continue;
            };

            row_counts.insert(table.clone(), count);
            if count < expected {
                failures.push(QualityFailure {
                    table: table.clone(),
                    reason: QualityFailureReason::TooFewRows { found: count, expected },
                });
            } else {
                info!(table = %table, rows = count, "data quality check passed");
            }
        }

        if !failures.is_empty() {
            return Err(NodeError::DataQuality { failures, row_counts });
        }
        Ok(TaskOutput {
            rows_affected: None,
            row_counts,
        })
    }
}

fn first_count(rows: &[Row]) -> Option<i64> {
    rows.first()?.first()?.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockWarehouse, StaticCredentials};
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            run_id: Uuid::new_v4(),
            task_id: "Run_data_quality_checks".into(),
            attempt: 1,
        }
    }

    fn check(tables: &[&str], expected_min_rows: i64) -> DataQualityOperator {
        DataQualityOperator::new(DataQualityConfig {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            expected_min_rows,
        })
    }

    fn collab(warehouse: &Arc<MockWarehouse>) -> Collaborators {
        Collaborators::new(warehouse.clone(), Arc::new(StaticCredentials::empty()))
    }

    #[tokio::test]
    async fn empty_fact_table_fails_but_other_counts_are_kept() {
        let warehouse = Arc::new(
            MockWarehouse::new()
                .with_table("songplays", 0)
                .with_table("users", 5),
        );

        let err = check(&["songplays", "users"], 1)
            .execute(&ctx(), &collab(&warehouse))
            .await
            .unwrap_err();

        match err {
            NodeError::DataQuality { failures, row_counts } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].table, "songplays");
                assert_eq!(row_counts.get("users"), Some(&5));
                assert_eq!(row_counts.get("songplays"), Some(&0));
            }
            other => panic!("expected data quality error, got {other:?}"),
        }
        // Both tables were queried.
        assert_eq!(warehouse.queried_verbs(), vec!["COUNT songplays", "COUNT users"]);
    }

    #[tokio::test]
    async fn no_result_rows_is_a_failure() {
        let warehouse = Arc::new(MockWarehouse::new().with_empty_result("times"));

        let err = check(&["times"], 1)
            .execute(&ctx(), &collab(&warehouse))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "data quality check failed: times returned no results"
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn all_tables_passing_records_counts() {
        let warehouse = Arc::new(
            MockWarehouse::new()
                .with_table("songs", 14896)
                .with_table("artists", 10025),
        );

        let out = check(&["songs", "artists"], 1)
            .execute(&ctx(), &collab(&warehouse))
            .await
            .unwrap();

        assert_eq!(out.row_counts.len(), 2);
        assert_eq!(out.row_counts["songs"], 14896);
    }

    #[tokio::test]
    async fn failing_query_is_retryable_after_checking_everything() {
        let warehouse = Arc::new(
            MockWarehouse::new()
                .with_table("users", 3)
                .fail_on("COUNT", "songplays"),
        );

        let err = check(&["songplays", "users"], 1)
            .execute(&ctx(), &collab(&warehouse))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(warehouse.queried_verbs(), vec!["COUNT songplays", "COUNT users"]);
        match err {
            NodeError::DataQuality { row_counts, .. } => assert_eq!(row_counts["users"], 3),
            other => panic!("expected data quality error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn violation_alongside_query_error_is_reported_and_not_retried() {
        let warehouse = Arc::new(
            MockWarehouse::new()
                .with_table("songplays", 0)
                .with_table("users", 5)
                .fail_on("COUNT", "songs"),
        );

        let err = check(&["songplays", "users", "songs"], 1)
            .execute(&ctx(), &collab(&warehouse))
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "data quality check failed: songplays contained 0 rows (expected at least 1); \
             songs could not be counted: statement failed: COUNT songs rejected"
        );
        match err {
            NodeError::DataQuality { failures, row_counts } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(row_counts.get("songplays"), Some(&0));
                assert_eq!(row_counts.get("users"), Some(&5));
                assert!(!row_counts.contains_key("songs"));
            }
            other => panic!("expected data quality error, got {other:?}"),
        }
    }
}
