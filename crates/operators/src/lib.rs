//! `operators` crate — the `Operator` trait, the built-in task behaviours,
//! and the collaborator interfaces they call out to.
//!
//! Every task behaviour implements [`Operator`]. The engine crate builds one
//! operator per task from its validated [`TaskConfig`] and dispatches
//! execution through the trait object.

pub mod collaborators;
pub mod config;
pub mod data_quality;
pub mod error;
pub mod load_dimension;
pub mod load_fact;
pub mod mock;
pub mod noop;
pub mod sql;
pub mod stage;
pub mod statement;
pub mod traits;

use std::sync::Arc;

pub use collaborators::{AwsCredentials, Collaborators, CredentialsProvider, WarehouseClient};
pub use config::{OperatorKind, TaskConfig};
pub use error::{CredentialsError, InvalidConfig, NodeError, WarehouseError};
pub use statement::{CopyFormat, Row, Statement};
pub use traits::{ExecutionContext, Operator, TaskOutput};

/// Build the operator that implements `config`.
pub fn build_operator(config: &TaskConfig) -> Arc<dyn Operator> {
    match config {
        TaskConfig::Noop => Arc::new(noop::NoopOperator),
        TaskConfig::Sql(c) => Arc::new(sql::SqlOperator::new(c.clone())),
        TaskConfig::Stage(c) => Arc::new(stage::StageOperator::new(c.clone())),
        TaskConfig::LoadFact(c) => Arc::new(load_fact::LoadFactOperator::new(c.clone())),
        TaskConfig::LoadDimension(c) => {
            Arc::new(load_dimension::LoadDimensionOperator::new(c.clone()))
        }
        TaskConfig::DataQuality(c) => {
            Arc::new(data_quality::DataQualityOperator::new(c.clone()))
        }
    }
}
