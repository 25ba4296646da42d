//! PostgreSQL connection pool wrapper.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::error::DbError;

/// Default maximum number of pooled connections.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connection acquire timeout.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Wrapper around [`sqlx::PgPool`] with sensible defaults.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// Connect to the database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Self::connect_with_max(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with a custom maximum connection count.
    pub async fn connect_with_max(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;

        tracing::info!(max_connections, "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Access the underlying `sqlx` pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}
