//! `engine` crate — task models, graph validation, retry, and the execution
//! engine.

pub mod clock;
pub mod context;
pub mod dag;
pub mod definition;
pub mod error;
pub mod executor;
pub mod models;
pub mod observability;
pub mod retry;
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use context::{RunContext, RunStatus, RunSummary, TaskResult, TaskStatus};
pub use dag::{Graph, GraphBuilder};
pub use definition::PipelineDefinition;
pub use error::{EngineError, RetryError};
pub use executor::{registry_for, Executor, ExecutorConfig, OperatorRegistry};
pub use models::{RetrySettings, TaskNode};
pub use observability::{AttemptEvent, AttemptOutcome, ObservabilitySink, TracingSink};
pub use retry::{Backoff, RetryPolicy};
