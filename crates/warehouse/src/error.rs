//! Typed error type for the warehouse crate.

use thiserror::Error;

use operators::WarehouseError;

#[derive(Debug, Error)]
pub enum PgWarehouseError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("column {index} of a result row has an unsupported type")]
    UnsupportedColumn { index: usize },
}

impl From<PgWarehouseError> for WarehouseError {
    fn from(err: PgWarehouseError) -> Self {
        match err {
            PgWarehouseError::Sqlx(
                e @ (sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed),
            ) => WarehouseError::Connection(e.to_string()),
            other => WarehouseError::Statement(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_connection_errors() {
        let err: WarehouseError = PgWarehouseError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, WarehouseError::Connection(_)));
    }

    #[test]
    fn other_errors_are_statement_errors() {
        let err: WarehouseError = PgWarehouseError::Sqlx(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, WarehouseError::Statement(_)));

        let err: WarehouseError = PgWarehouseError::UnsupportedColumn { index: 2 }.into();
        assert_eq!(
            err.to_string(),
            "statement failed: column 2 of a result row has an unsupported type"
        );
    }
}
