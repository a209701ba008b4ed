//! Interfaces to the systems operators talk to, and the bundle handed to
//! every operator at execution time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{CredentialsError, NodeError, WarehouseError},
    statement::{Row, Statement},
};

/// The data warehouse (Redshift in production).
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Run a statement that returns no rows; yields the affected row count.
    async fn execute(&self, statement: &Statement) -> Result<u64, WarehouseError>;

    /// Run a statement that returns rows.
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, WarehouseError>;
}

/// Looks up object-storage access keys by credential id.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn resolve(&self, credential_id: &str) -> Result<AwsCredentials, CredentialsError>;
}

/// Access key pair for the object store.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl AwsCredentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Everything an operator may call out to during `execute`.
///
/// Calls made through the helper methods are bounded by `call_timeout`;
/// exceeding it surfaces as [`NodeError::Timeout`].
#[derive(Clone)]
pub struct Collaborators {
    pub warehouse: Arc<dyn WarehouseClient>,
    pub credentials: Arc<dyn CredentialsProvider>,
    pub call_timeout: Option<Duration>,
}

impl Collaborators {
    pub fn new(
        warehouse: Arc<dyn WarehouseClient>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        Self {
            warehouse,
            credentials,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub async fn execute(&self, statement: &Statement) -> Result<u64, NodeError> {
        self.bounded(statement.to_string(), self.warehouse.execute(statement))
            .await
    }

    pub async fn query(&self, statement: &Statement) -> Result<Vec<Row>, NodeError> {
        self.bounded(statement.to_string(), self.warehouse.query(statement))
            .await
    }

    pub async fn resolve_credentials(
        &self,
        credential_id: &str,
    ) -> Result<AwsCredentials, NodeError> {
        self.bounded(
            format!("credentials lookup '{credential_id}'"),
            self.credentials.resolve(credential_id),
        )
        .await
    }

    async fn bounded<T, E, F>(&self, what: String, call: F) -> Result<T, NodeError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(NodeError::Timeout { what, after: limit }),
            },
            None => call.await.map_err(Into::into),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}
