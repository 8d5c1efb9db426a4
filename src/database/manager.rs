use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pool manager for the CPMS database.
///
/// The pool is created lazily on first use so the binary can start (and serve
/// its health endpoint) before the database is reachable.
pub struct DatabaseManager;

static POOL: OnceLock<PgPool> = OnceLock::new();

impl DatabaseManager {
    pub fn pool() -> Result<PgPool, DatabaseError> {
        if let Some(pool) = POOL.get() {
            return Ok(pool.clone());
        }

        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let cfg = &config::config().database;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
            .connect_lazy(&url)?;

        // A concurrent first caller may have won the race; use theirs.
        let pool = POOL.get_or_init(|| pool).clone();
        info!("Created database pool");
        Ok(pool)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check() -> Result<(), DatabaseError> {
        let pool = Self::pool()?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }
}
