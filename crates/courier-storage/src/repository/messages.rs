//! Message repository

use crate::db::{db_error, DatabasePool};
use crate::models::{CreateMessage, Message, UpdateMessage};
use async_trait::async_trait;
use courier_common::types::{MessageId, UserId};
use courier_common::Result;
use uuid::Uuid;

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, input: CreateMessage) -> Result<Message>;
    async fn get(&self, id: MessageId) -> Result<Option<Message>>;
    /// List messages ordered by title; `None` lists every owner's rows
    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Message>>;
    async fn update(&self, id: MessageId, input: UpdateMessage) -> Result<Option<Message>>;
    /// Delete a message together with the mailings that send it
    async fn delete(&self, id: MessageId) -> Result<bool>;
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, title, content, owner_id, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.owner_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)
    }

    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Message>> {
        if let Some(owner_id) = owner_id {
            sqlx::query_as::<_, Message>(
                "SELECT * FROM messages WHERE owner_id = $1 ORDER BY title ASC",
            )
            .bind(owner_id)
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)
        } else {
            sqlx::query_as::<_, Message>("SELECT * FROM messages ORDER BY title ASC")
                .fetch_all(self.pool.pool())
                .await
                .map_err(db_error)
        }
    }

    async fn update(&self, id: MessageId, input: UpdateMessage) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>(
            "UPDATE messages SET title = $2, content = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.content)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn delete(&self, id: MessageId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }
}
