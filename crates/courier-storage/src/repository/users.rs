//! User repository

use crate::db::{db_error, DatabasePool};
use crate::models::{CreateUser, User};
use async_trait::async_trait;
use courier_common::types::{Permission, UserId};
use courier_common::Result;
use uuid::Uuid;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: CreateUser) -> Result<User>;
    async fn get(&self, id: UserId) -> Result<Option<User>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn grant_permission(&self, id: UserId, permission: Permission) -> Result<Option<User>>;
}

/// Database user repository
pub struct DbUserRepository {
    pool: DatabasePool,
}

impl DbUserRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for DbUserRepository {
    async fn create(&self, input: CreateUser) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, username, password_hash, phone_number, country, is_active, is_superuser, permissions, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, $7, '[]'::jsonb, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.email)
        .bind(&input.username)
        .bind(&input.password_hash)
        .bind(&input.phone_number)
        .bind(&input.country)
        .bind(input.is_superuser)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)
    }

    async fn grant_permission(&self, id: UserId, permission: Permission) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET permissions = CASE
                WHEN permissions @> jsonb_build_array($2::text) THEN permissions
                ELSE permissions || jsonb_build_array($2::text)
            END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(permission.to_string())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)
    }
}
