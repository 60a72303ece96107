//! # Courier Database
//!
//! Connection pooling for the email request ledger and the advisory lock.

use anyhow::{Context, Result};
use courier_config::DbConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Create a PostgreSQL connection pool
///
/// The advisory lock holds one pooled connection per in-flight request, so
/// `max_connections` bounds concurrent lock holders as well as queries.
pub async fn create_pool(database_url: &str, db_config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(db_config.idle_timeout_secs)))
        .test_before_acquire(true)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tracing::debug!(
        max_connections = db_config.max_connections,
        "PostgreSQL pool created"
    );

    Ok(pool)
}
