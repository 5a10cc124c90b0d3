//! Delivery attempt repository

use crate::db::{db_error, DatabasePool};
use crate::models::{DeliveryAttempt, NewDeliveryAttempt};
use async_trait::async_trait;
use courier_common::types::{MailingId, UserId};
use courier_common::Result;
use uuid::Uuid;

/// Delivery attempt repository trait.
///
/// Attempts are append-only: there is no update or delete.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn record(&self, input: NewDeliveryAttempt) -> Result<DeliveryAttempt>;
    /// List attempts newest first, optionally narrowed to an owner and a mailing
    async fn list(
        &self,
        owner_id: Option<UserId>,
        mailing_id: Option<MailingId>,
    ) -> Result<Vec<DeliveryAttempt>>;
    async fn count_by_mailing(&self, mailing_id: MailingId) -> Result<i64>;
}

/// Database delivery attempt repository
pub struct DbAttemptRepository {
    pool: DatabasePool,
}

impl DbAttemptRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptRepository for DbAttemptRepository {
    async fn record(&self, input: NewDeliveryAttempt) -> Result<DeliveryAttempt> {
        sqlx::query_as::<_, DeliveryAttempt>(
            r#"
            INSERT INTO delivery_attempts (id, attempt_datetime, status, server_response, recipient_email, mailing_id, owner_id)
            VALUES ($1, NOW(), $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.status.to_string())
        .bind(&input.server_response)
        .bind(&input.recipient_email)
        .bind(input.mailing_id)
        .bind(input.owner_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn list(
        &self,
        owner_id: Option<UserId>,
        mailing_id: Option<MailingId>,
    ) -> Result<Vec<DeliveryAttempt>> {
        sqlx::query_as::<_, DeliveryAttempt>(
            r#"
            SELECT * FROM delivery_attempts
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::uuid IS NULL OR mailing_id = $2)
            ORDER BY attempt_datetime DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .bind(mailing_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn count_by_mailing(&self, mailing_id: MailingId) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM delivery_attempts WHERE mailing_id = $1")
                .bind(mailing_id)
                .fetch_one(self.pool.pool())
                .await
                .map_err(db_error)?;
        Ok(count.0)
    }
}
