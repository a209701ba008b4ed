//! Populate a dimension table, optionally reloading it from scratch.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::{
    collaborators::Collaborators,
    config::{LoadDimensionConfig, OperatorKind},
    statement::Statement,
    traits::{ExecutionContext, Operator, TaskOutput},
    NodeError,
};

#[derive(Debug, Clone)]
pub struct LoadDimensionOperator {
    config: LoadDimensionConfig,
}

impl LoadDimensionOperator {
    pub fn new(config: LoadDimensionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Operator for LoadDimensionOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::LoadDimension
    }

    /// With `truncate` set the insert only runs once the truncate succeeded.
    #[instrument(
        skip_all,
        fields(task_id = %ctx.task_id, table = %self.config.table, attempt = ctx.attempt)
    )]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError> {
        if self.config.truncate {
            info!("truncating table for reload");
            collaborators
                .execute(&Statement::Truncate {
                    table: self.config.table.clone(),
                })
                .await?;
        }

        info!("loading dimension table");
        let inserted = collaborators
            .execute(&Statement::InsertSelect {
                table: self.config.table.clone(),
                select_sql: self.config.select_sql.clone(),
            })
            .await?;
        Ok(TaskOutput::affected(inserted))
    }
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
            task_id: "Load_user_dim_table".into(),
            attempt: 1,
        }
    }

    fn users(truncate: bool) -> LoadDimensionOperator {
        LoadDimensionOperator::new(LoadDimensionConfig {
            table: "users".into(),
            select_sql: "SELECT DISTINCT userid FROM staging_events".into(),
            truncate,
        })
    }

    #[tokio::test]
    async fn failed_truncate_never_attempts_insert() {
        let warehouse = Arc::new(MockWarehouse::new().fail_on("TRUNCATE", "users"));
        let collab = Collaborators::new(warehouse.clone(), Arc::new(StaticCredentials::empty()));

        let err = users(true).execute(&ctx(), &collab).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(warehouse.executed_verbs(), vec!["TRUNCATE users"]);
    }

    #[tokio::test]
    async fn append_mode_skips_truncate() {
        let warehouse = Arc::new(MockWarehouse::new().with_insert_rows("users", 4));
        let collab = Collaborators::new(warehouse.clone(), Arc::new(StaticCredentials::empty()));

        users(false).execute(&ctx(), &collab).await.unwrap();
        users(false).execute(&ctx(), &collab).await.unwrap();

        assert_eq!(warehouse.executed_verbs(), vec!["INSERT users", "INSERT users"]);
        assert_eq!(warehouse.row_count("users"), 8);
    }

    #[tokio::test]
    async fn truncate_reload_is_idempotent() {
        let warehouse = Arc::new(MockWarehouse::new().with_insert_rows("users", 5));
        let collab = Collaborators::new(warehouse.clone(), Arc::new(StaticCredentials::empty()));

        users(true).execute(&ctx(), &collab).await.unwrap();
        let first = warehouse.row_count("users");
        users(true).execute(&ctx(), &collab).await.unwrap();
        let second = warehouse.row_count("users");

        assert_eq!(first, 5);
        assert_eq!(first, second);
    }
}
