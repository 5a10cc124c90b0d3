//! Database connection and pool management

use courier_common::config::DatabaseConfig;
use courier_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// PostgreSQL error code for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// Database pool wrapper
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let url = Self::build_url(config)?;

        info!(backend = %config.backend, "Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect: {}", e)))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Build database URL from configuration
    fn build_url(config: &DatabaseConfig) -> Result<String> {
        match config.backend.as_str() {
            "postgres" => config
                .url
                .clone()
                .ok_or_else(|| Error::Config("Database URL required for PostgreSQL".to_string())),
            other => Err(Error::Config(format!(
                "Backend {} has no connection pool",
                other
            ))),
        }
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed");
        Ok(())
    }
}

/// Convert a sqlx error, mapping unique violations to `Error::Conflict`
pub(crate) fn db_error(e: sqlx::Error) -> Error {
    if let Some(db) = e.as_database_error() {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return Error::Conflict(db.message().to_string());
        }
    }
    Error::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_requires_postgres_url() {
        let config = DatabaseConfig {
            backend: "postgres".to_string(),
            url: None,
            max_connections: 5,
            min_connections: 1,
        };
        assert!(matches!(DatabasePool::build_url(&config), Err(Error::Config(_))));

        let config = DatabaseConfig {
            backend: "memory".to_string(),
            url: Some("postgres://localhost/courier".to_string()),
            max_connections: 5,
            min_connections: 1,
        };
        assert!(DatabasePool::build_url(&config).is_err());
    }

    #[test]
    fn test_db_error_passthrough() {
        let err = db_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Database(_)));
    }
}
