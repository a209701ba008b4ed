//! Append rows from the staging tables into a fact table.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::{
    collaborators::Collaborators,
    config::{LoadFactConfig, OperatorKind},
    statement::Statement,
    traits::{ExecutionContext, Operator, TaskOutput},
    NodeError,
};

#[derive(Debug, Clone)]
pub struct LoadFactOperator {
    config: LoadFactConfig,
}

impl LoadFactOperator {
    pub fn new(config: LoadFactConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Operator for LoadFactOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::LoadFact
    }

    /// Fact tables are append-only; nothing is ever truncated here.
    #[instrument(
        skip_all,
        fields(task_id = %ctx.task_id, table = %self.config.table, attempt = ctx.attempt)
    )]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError> {
        info!("loading fact table");
        let inserted = collaborators
            .execute(&Statement::InsertSelect {
                table: self.config.table.clone(),
                select_sql: self.config.select_sql.clone(),
            })
            .await?;
        info!(rows = inserted, "fact table loaded");
        Ok(TaskOutput::affected(inserted))
    }
}
