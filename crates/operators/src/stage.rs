//! Copy raw JSON from object storage into a staging table.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::{
    collaborators::Collaborators,
    config::{OperatorKind, StageConfig},
    statement::Statement,
    traits::{ExecutionContext, Operator, TaskOutput},
    NodeError,
};

#[derive(Debug, Clone)]
pub struct StageOperator {
    config: StageConfig,
}

impl StageOperator {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Operator for StageOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Stage
    }

    /// Credentials are resolved before anything is cleared, so a missing key
    /// pair leaves the previous staging data in place.
    #[instrument(
        skip_all,
        fields(task_id = %ctx.task_id, table = %self.config.table, attempt = ctx.attempt)
    )]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError> {
        let credentials = collaborators
            .resolve_credentials(&self.config.credentials_id)
            .await?;

        info!("clearing data from destination table");
        collaborators
            .execute(&Statement::Clear {
                table: self.config.table.clone(),
            })
            .await?;

        info!(source = %self.config.source, "copying data from object storage");
        let copied = collaborators
            .execute(&Statement::Copy {
                table: self.config.table.clone(),
                source: self.config.source.clone(),
                credentials,
                format: self.config.format.clone(),
                region: self.config.region.clone(),
            })
            .await?;
        Ok(TaskOutput::affected(copied))
    }
}
