//! `warehouse` crate — the real collaborators.
//!
//! A sqlx-backed [`PgWarehouse`] that renders structured statements into
//! Redshift SQL, and an environment-variable [`EnvCredentials`] provider.
//! No pipeline logic lives here.

pub mod client;
pub mod credentials;
pub mod error;
pub mod pool;
pub mod render;

pub use client::PgWarehouse;
pub use credentials::EnvCredentials;
pub use error::PgWarehouseError;
pub use pool::{create_pool, WarehousePool};
