//! Repository bundle shared by the dispatcher, the web UI and the CLI

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use crate::models::Overview;
use crate::repository::{
    AttemptRepository, DbAttemptRepository, DbMailingRepository, DbMessageRepository,
    DbRecipientRepository, DbSessionRepository, DbStatisticsRepository, DbUserRepository,
    MailingRepository, MessageRepository, RecipientRepository, SessionRepository,
    StatisticsRepository, UserRepository,
};
use courier_common::config::DatabaseConfig;
use courier_common::types::MailingStatus;
use courier_common::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Every repository behind a trait object
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub recipients: Arc<dyn RecipientRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub mailings: Arc<dyn MailingRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub statistics: Arc<dyn StatisticsRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            users: Arc::new(DbUserRepository::new(pool.clone())),
            sessions: Arc::new(DbSessionRepository::new(pool.clone())),
            recipients: Arc::new(DbRecipientRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool.clone())),
            mailings: Arc::new(DbMailingRepository::new(pool.clone())),
            attempts: Arc::new(DbAttemptRepository::new(pool.clone())),
            statistics: Arc::new(DbStatisticsRepository::new(pool)),
        }
    }

    /// Repositories backed by a single in-memory store
    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            sessions: store.clone(),
            recipients: store.clone(),
            messages: store.clone(),
            mailings: store.clone(),
            attempts: store.clone(),
            statistics: store,
        }
    }

    /// Open the backend named in the configuration, running migrations for
    /// PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        match config.backend.as_str() {
            "postgres" => {
                let pool = DatabasePool::new(config).await?;
                pool.migrate().await?;
                Ok(Self::postgres(pool))
            }
            "memory" => {
                info!("Using in-memory storage; data will not survive a restart");
                Ok(Self::memory())
            }
            other => Err(Error::Config(format!("Unknown database backend: {}", other))),
        }
    }

    /// Home page counters
    pub async fn overview(&self) -> Result<Overview> {
        Ok(Overview {
            total_mailings: self.mailings.count(None).await?,
            active_mailings: self.mailings.count(Some(MailingStatus::Running)).await?,
            unique_recipients: self.recipients.count_unique().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateMailing, CreateMessage, CreateRecipient};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_overview_counts() {
        let repos = Repositories::memory();
        let message = repos
            .messages
            .create(CreateMessage {
                title: "Hello".to_string(),
                content: "World".to_string(),
                owner_id: None,
            })
            .await
            .unwrap();
        for email in ["a@example.com", "b@example.com"] {
            repos
                .recipients
                .create(CreateRecipient {
                    email: email.to_string(),
                    full_name: email.to_string(),
                    note: String::new(),
                    owner_id: None,
                })
                .await
                .unwrap();
        }
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mailing = repos
                .mailings
                .create(CreateMailing {
                    message_id: message.id,
                    recipient_ids: vec![],
                    first_send_time: None,
                    end_send_time: None,
                    owner_id: None,
                })
                .await
                .unwrap();
            ids.push(mailing.id);
        }
        repos.mailings.claim_for_dispatch(ids[0]).await.unwrap();

        let overview = repos.overview().await.unwrap();
        assert_eq!(
            overview,
            Overview {
                total_mailings: 3,
                active_mailings: 1,
                unique_recipients: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let config = DatabaseConfig {
            backend: "sqlite".to_string(),
            url: None,
            max_connections: 1,
            min_connections: 1,
        };
        assert!(matches!(
            Repositories::connect(&config).await,
            Err(Error::Config(_))
        ));
    }
}
