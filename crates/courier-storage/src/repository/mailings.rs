//! Mailing repository

use crate::db::{db_error, DatabasePool};
use crate::models::{CreateMailing, Mailing, Recipient, UpdateMailing};
use async_trait::async_trait;
use courier_common::types::{MailingId, MailingStatus, RecipientId, UserId};
use courier_common::Result;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// Mailing repository trait
#[async_trait]
pub trait MailingRepository: Send + Sync {
    async fn create(&self, input: CreateMailing) -> Result<Mailing>;
    async fn get(&self, id: MailingId) -> Result<Option<Mailing>>;
    /// List mailings newest first; `None` lists every owner's rows
    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Mailing>>;
    /// Replace the message, schedule and recipient set of a mailing
    async fn update(&self, id: MailingId, input: UpdateMailing) -> Result<Option<Mailing>>;
    async fn delete(&self, id: MailingId) -> Result<bool>;
    /// Recipients of a mailing ordered by email
    async fn recipients(&self, id: MailingId) -> Result<Vec<Recipient>>;
    async fn count(&self, status: Option<MailingStatus>) -> Result<i64>;
    /// Move an unblocked mailing from created to running.
    ///
    /// Returns `false` when another caller got there first or the mailing is
    /// blocked or not in the created state.
    async fn claim_for_dispatch(&self, id: MailingId) -> Result<bool>;
    /// Move a running mailing to completed
    async fn complete(&self, id: MailingId) -> Result<bool>;
    async fn set_blocked(&self, id: MailingId, blocked: bool) -> Result<Option<Mailing>>;
}

/// Database mailing repository
pub struct DbMailingRepository {
    pool: DatabasePool,
}

impl DbMailingRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn insert_members(
        tx: &mut Transaction<'_, Postgres>,
        mailing_id: MailingId,
        recipient_ids: &[RecipientId],
    ) -> Result<()> {
        for recipient_id in recipient_ids {
            sqlx::query(
                r#"
                INSERT INTO mailing_recipients (mailing_id, recipient_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(mailing_id)
            .bind(recipient_id)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl MailingRepository for DbMailingRepository {
    async fn create(&self, input: CreateMailing) -> Result<Mailing> {
        let mut tx = self.pool.pool().begin().await.map_err(db_error)?;

        let mailing = sqlx::query_as::<_, Mailing>(
            r#"
            INSERT INTO mailings (id, first_send_time, end_send_time, status, message_id, owner_id, is_blocked, created_at)
            VALUES ($1, $2, $3, 'created', $4, $5, false, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.first_send_time)
        .bind(input.end_send_time)
        .bind(input.message_id)
        .bind(input.owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        Self::insert_members(&mut tx, mailing.id, &input.recipient_ids).await?;
        tx.commit().await.map_err(db_error)?;

        Ok(mailing)
    }

    async fn get(&self, id: MailingId) -> Result<Option<Mailing>> {
        sqlx::query_as::<_, Mailing>("SELECT * FROM mailings WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)
    }

    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Mailing>> {
        if let Some(owner_id) = owner_id {
            sqlx::query_as::<_, Mailing>(
                "SELECT * FROM mailings WHERE owner_id = $1 ORDER BY created_at DESC",
            )
            .bind(owner_id)
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)
        } else {
            sqlx::query_as::<_, Mailing>("SELECT * FROM mailings ORDER BY created_at DESC")
                .fetch_all(self.pool.pool())
                .await
                .map_err(db_error)
        }
    }

    async fn update(&self, id: MailingId, input: UpdateMailing) -> Result<Option<Mailing>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_error)?;

        let mailing = sqlx::query_as::<_, Mailing>(
            r#"
            UPDATE mailings SET
                message_id = $2,
                first_send_time = $3,
                end_send_time = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.message_id)
        .bind(input.first_send_time)
        .bind(input.end_send_time)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let Some(mailing) = mailing else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM mailing_recipients WHERE mailing_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        Self::insert_members(&mut tx, id, &input.recipient_ids).await?;
        tx.commit().await.map_err(db_error)?;

        Ok(Some(mailing))
    }

    async fn delete(&self, id: MailingId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mailings WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn recipients(&self, id: MailingId) -> Result<Vec<Recipient>> {
        sqlx::query_as::<_, Recipient>(
            r#"
            SELECT r.* FROM recipients r
            JOIN mailing_recipients mr ON mr.recipient_id = r.id
            WHERE mr.mailing_id = $1
            ORDER BY r.email ASC
            "#,
        )
        .bind(id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn count(&self, status: Option<MailingStatus>) -> Result<i64> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as("SELECT COUNT(*) FROM mailings WHERE status = $1")
                .bind(status.to_string())
                .fetch_one(self.pool.pool())
                .await
                .map_err(db_error)?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM mailings")
                .fetch_one(self.pool.pool())
                .await
                .map_err(db_error)?
        };
        Ok(count.0)
    }

    async fn claim_for_dispatch(&self, id: MailingId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mailings SET
                status = 'running',
                first_send_time = COALESCE(first_send_time, NOW())
            WHERE id = $1 AND status = 'created' AND is_blocked = false
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, id: MailingId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mailings SET
                status = 'completed',
                end_send_time = COALESCE(end_send_time, NOW())
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_blocked(&self, id: MailingId, blocked: bool) -> Result<Option<Mailing>> {
        sqlx::query_as::<_, Mailing>(
            "UPDATE mailings SET is_blocked = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(blocked)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)
    }
}
