//! Run configured SQL verbatim, e.g. the `create_tables` script.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::{
    collaborators::Collaborators,
    config::{OperatorKind, SqlConfig},
    statement::Statement,
    traits::{ExecutionContext, Operator, TaskOutput},
    NodeError,
};

#[derive(Debug, Clone)]
pub struct SqlOperator {
    config: SqlConfig,
}

impl SqlOperator {
    pub fn new(config: SqlConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Operator for SqlOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Sql
    }

    #[instrument(skip_all, fields(task_id = %ctx.task_id, attempt = ctx.attempt))]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError> {
        let mut affected = 0u64;
        for (i, sql) in self.config.statements.iter().enumerate() {
            info!("running statement {}/{}", i + 1, self.config.statements.len());
            affected += collaborators.execute(&Statement::Raw(sql.clone())).await?;
        }
        Ok(TaskOutput::affected(affected))
    }
}
