//! Postgres-protocol connection pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::PgWarehouseError;

/// Shared pool used by every warehouse call of a run.
pub type WarehousePool = PgPool;

/// Connect to the warehouse at `database_url`.
///
/// `max_connections` caps how many statements can be in flight at once, which
/// also bounds how much of the graph's parallelism reaches the warehouse.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<WarehousePool, PgWarehouseError> {
    info!("Connecting to warehouse (max_connections={})", max_connections);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
