//! `WarehouseClient` backed by a sqlx Postgres pool.
//!
//! Redshift speaks the Postgres wire protocol. Statements are rendered to
//! plain SQL and sent without bind parameters (simple query protocol), which
//! `COPY` and multi-column `CREATE TABLE` text both require.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Executor, Row as _};
use tracing::debug;

use operators::{Row, Statement, WarehouseClient, WarehouseError};

use crate::{pool::WarehousePool, render::render, PgWarehouseError};

pub struct PgWarehouse {
    pool: WarehousePool,
}

impl PgWarehouse {
    pub fn new(pool: WarehousePool) -> Self {
        Self { pool }
    }

    async fn run_execute(&self, statement: &Statement) -> Result<u64, PgWarehouseError> {
        let sql = render(statement);
        debug!(statement = %statement, "executing");
        let result = self.pool.execute(sql.as_str()).await?;
        Ok(result.rows_affected())
    }

    async fn run_query(&self, statement: &Statement) -> Result<Vec<Row>, PgWarehouseError> {
        let sql = render(statement);
        debug!(statement = %statement, "querying");
        let rows = self.pool.fetch_all(sql.as_str()).await?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl WarehouseClient for PgWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<u64, WarehouseError> {
        Ok(self.run_execute(statement).await?)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, WarehouseError> {
        Ok(self.run_query(statement).await?)
    }
}

/// Decode every column as the first JSON-compatible type it fits.
fn decode_row(row: &PgRow) -> Result<Row, PgWarehouseError> {
    (0..row.columns().len())
        .map(|index| decode_column(row, index))
        .collect()
}

fn decode_column(row: &PgRow, index: usize) -> Result<Value, PgWarehouseError> {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Ok(value.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return Ok(value.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return Ok(value.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return Ok(value.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value.map(Value::from).unwrap_or(Value::Null));
    }
    let column = &row.columns()[index];
    debug!(column = column.name(), "unsupported column type");
    Err(PgWarehouseError::UnsupportedColumn { index })
}
