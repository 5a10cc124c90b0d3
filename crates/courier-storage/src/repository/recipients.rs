//! Recipient repository

use crate::db::{db_error, DatabasePool};
use crate::models::{CreateRecipient, Recipient, UpdateRecipient};
use async_trait::async_trait;
use courier_common::types::{RecipientId, UserId};
use courier_common::Result;
use uuid::Uuid;

/// Recipient repository trait
#[async_trait]
pub trait RecipientRepository: Send + Sync {
    async fn create(&self, input: CreateRecipient) -> Result<Recipient>;
    async fn get(&self, id: RecipientId) -> Result<Option<Recipient>>;
    /// List recipients ordered by name; `None` lists every owner's rows
    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Recipient>>;
    async fn update(&self, id: RecipientId, input: UpdateRecipient) -> Result<Option<Recipient>>;
    async fn delete(&self, id: RecipientId) -> Result<bool>;
    async fn count_unique(&self) -> Result<i64>;
}

/// Database recipient repository
pub struct DbRecipientRepository {
    pool: DatabasePool,
}

impl DbRecipientRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientRepository for DbRecipientRepository {
    async fn create(&self, input: CreateRecipient) -> Result<Recipient> {
        sqlx::query_as::<_, Recipient>(
            r#"
            INSERT INTO recipients (id, email, full_name, note, owner_id, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.email)
        .bind(&input.full_name)
        .bind(&input.note)
        .bind(input.owner_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn get(&self, id: RecipientId) -> Result<Option<Recipient>> {
        sqlx::query_as::<_, Recipient>("SELECT * FROM recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)
    }

    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Recipient>> {
        if let Some(owner_id) = owner_id {
            sqlx::query_as::<_, Recipient>(
                "SELECT * FROM recipients WHERE owner_id = $1 ORDER BY full_name ASC, email ASC",
            )
            .bind(owner_id)
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)
        } else {
            sqlx::query_as::<_, Recipient>(
                "SELECT * FROM recipients ORDER BY full_name ASC, email ASC",
            )
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)
        }
    }

    async fn update(&self, id: RecipientId, input: UpdateRecipient) -> Result<Option<Recipient>> {
        sqlx::query_as::<_, Recipient>(
            r#"
            UPDATE recipients SET
                email = $2,
                full_name = $3,
                note = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.email)
        .bind(&input.full_name)
        .bind(&input.note)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn delete(&self, id: RecipientId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recipients WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_unique(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT lower(email)) FROM recipients")
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_error)?;
        Ok(count.0)
    }
}
