//! Marker task with no work (pipeline begin/end).

use async_trait::async_trait;

use crate::{
    collaborators::Collaborators,
    config::OperatorKind,
    traits::{ExecutionContext, Operator, TaskOutput},
    NodeError,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOperator;

#[async_trait]
impl Operator for NoopOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Noop
    }

    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        _collaborators: &Collaborators,
    ) -> Result<TaskOutput, NodeError> {
        Ok(TaskOutput::default())
    }
}
