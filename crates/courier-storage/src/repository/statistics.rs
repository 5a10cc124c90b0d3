//! User statistics repository

use crate::db::{db_error, DatabasePool};
use crate::models::UserStatistics;
use async_trait::async_trait;
use courier_common::types::UserId;
use courier_common::Result;

/// Statistics repository trait
#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    /// Fetch the counters for a user, creating a zeroed row on first use
    async fn get_or_create(&self, user_id: UserId) -> Result<UserStatistics>;
    /// Atomically count one delivery attempt
    async fn record_attempt(&self, user_id: UserId, success: bool) -> Result<UserStatistics>;
}

/// Database statistics repository
pub struct DbStatisticsRepository {
    pool: DatabasePool,
}

impl DbStatisticsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatisticsRepository for DbStatisticsRepository {
    async fn get_or_create(&self, user_id: UserId) -> Result<UserStatistics> {
        sqlx::query(
            r#"
            INSERT INTO user_statistics (user_id, total_mailings, successful_mailings, failed_mailings)
            VALUES ($1, 0, 0, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;

        sqlx::query_as::<_, UserStatistics>("SELECT * FROM user_statistics WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_error)
    }

    async fn record_attempt(&self, user_id: UserId, success: bool) -> Result<UserStatistics> {
        let (ok, failed) = if success { (1_i64, 0_i64) } else { (0, 1) };

        sqlx::query_as::<_, UserStatistics>(
            r#"
            INSERT INTO user_statistics (user_id, total_mailings, successful_mailings, failed_mailings)
            VALUES ($1, 1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                total_mailings = user_statistics.total_mailings + 1,
                successful_mailings = user_statistics.successful_mailings + EXCLUDED.successful_mailings,
                failed_mailings = user_statistics.failed_mailings + EXCLUDED.failed_mailings
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(ok)
        .bind(failed)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)
    }
}
