//! Session repository

use crate::db::{db_error, DatabasePool};
use crate::models::Session;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use courier_common::types::UserId;
use courier_common::Result;
use uuid::Uuid;

/// Generate an opaque session token
pub fn new_session_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, user_id: UserId, ttl: Duration) -> Result<Session>;
    /// Get a session that has not yet expired
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn delete_expired(&self) -> Result<u64>;
}

/// Database session repository
pub struct DbSessionRepository {
    pool: DatabasePool,
}

impl DbSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for DbSessionRepository {
    async fn create(&self, user_id: UserId, ttl: Duration) -> Result<Session> {
        let now = Utc::now();
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new_session_token())
        .bind(user_id)
        .bind(now + ttl)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1 AND expires_at > NOW()")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(self.pool.pool())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}
