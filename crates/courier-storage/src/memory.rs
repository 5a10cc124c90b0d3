//! In-memory storage backend.
//!
//! Keeps every table in a `HashMap` behind a single `RwLock`, so each
//! repository call observes and mutates a consistent snapshot. Mirrors the
//! PostgreSQL backend's constraints: unique emails, cascading deletes and the
//! compare-and-swap status transitions. All data is lost on drop.

use crate::models::{
    CreateMailing, CreateMessage, CreateRecipient, CreateUser, DeliveryAttempt, Mailing, Message,
    NewDeliveryAttempt, Recipient, Session, UpdateMailing, UpdateMessage, UpdateRecipient, User,
    UserStatistics,
};
use crate::repository::sessions::new_session_token;
use crate::repository::{
    AttemptRepository, MailingRepository, MessageRepository, RecipientRepository,
    SessionRepository, StatisticsRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use courier_common::types::{
    MailingId, MailingStatus, MessageId, Permission, RecipientId, UserId,
};
use courier_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, Session>,
    recipients: HashMap<RecipientId, Recipient>,
    messages: HashMap<MessageId, Message>,
    mailings: HashMap<MailingId, Mailing>,
    members: HashMap<MailingId, Vec<RecipientId>>,
    attempts: Vec<DeliveryAttempt>,
    statistics: HashMap<UserId, UserStatistics>,
}

impl State {
    fn remove_mailing(&mut self, id: MailingId) -> bool {
        self.members.remove(&id);
        self.attempts.retain(|a| a.mailing_id != id);
        self.mailings.remove(&id).is_some()
    }

    fn member_ids(&self, recipient_ids: &[RecipientId]) -> Result<Vec<RecipientId>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(recipient_ids.len());
        for id in recipient_ids {
            if !self.recipients.contains_key(id) {
                return Err(foreign_key("recipient", *id));
            }
            if seen.insert(*id) {
                ids.push(*id);
            }
        }
        Ok(ids)
    }
}

fn foreign_key(table: &str, id: Uuid) -> Error {
    Error::Database(format!(
        "insert or update violates foreign key constraint: {} {} does not exist",
        table, id
    ))
}

/// Move a mailing to `next` if the status table allows it
fn advance(mailing: &mut Mailing, next: MailingStatus) -> bool {
    match mailing.status_enum() {
        Some(current) if current.can_transition_to(next) => {
            mailing.status = next.to_string();
            true
        }
        _ => false,
    }
}

fn duplicate_email(table: &str) -> Error {
    Error::Conflict(format!(
        "duplicate key value violates unique constraint \"{}_email_key\"",
        table
    ))
}

/// In-memory store implementing every repository trait
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, input: CreateUser) -> Result<User> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&input.email))
        {
            return Err(duplicate_email("users"));
        }

        let user = User {
            id: Uuid::now_v7(),
            email: input.email,
            username: input.username,
            password_hash: input.password_hash,
            phone_number: input.phone_number,
            country: input.country,
            is_active: true,
            is_superuser: input.is_superuser,
            permissions: serde_json::json!([]),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn grant_permission(&self, id: UserId, permission: Permission) -> Result<Option<User>> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };

        let name = serde_json::Value::String(permission.to_string());
        match user.permissions.as_array_mut() {
            Some(list) if list.contains(&name) => {}
            Some(list) => list.push(name),
            None => user.permissions = serde_json::Value::Array(vec![name]),
        }
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create(&self, user_id: UserId, ttl: Duration) -> Result<Session> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(foreign_key("user", user_id));
        }

        let now = Utc::now();
        let session = Session {
            id: new_session_token(),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        };
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self
            .state
            .read()
            .await
            .sessions
            .get(id)
            .filter(|s| !s.is_expired())
            .cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state.write().await.sessions.remove(id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired());
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl RecipientRepository for MemoryStore {
    async fn create(&self, input: CreateRecipient) -> Result<Recipient> {
        let mut state = self.state.write().await;
        if state.recipients.values().any(|r| r.email == input.email) {
            return Err(duplicate_email("recipients"));
        }

        let recipient = Recipient {
            id: Uuid::now_v7(),
            email: input.email,
            full_name: input.full_name,
            note: input.note,
            owner_id: input.owner_id,
            created_at: Utc::now(),
        };
        state.recipients.insert(recipient.id, recipient.clone());
        Ok(recipient)
    }

    async fn get(&self, id: RecipientId) -> Result<Option<Recipient>> {
        Ok(self.state.read().await.recipients.get(&id).cloned())
    }

    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Recipient>> {
        let state = self.state.read().await;
        let mut recipients: Vec<Recipient> = state
            .recipients
            .values()
            .filter(|r| owner_id.is_none() || r.owner_id == owner_id)
            .cloned()
            .collect();
        recipients.sort_by(|a, b| {
            a.full_name
                .cmp(&b.full_name)
                .then_with(|| a.email.cmp(&b.email))
        });
        Ok(recipients)
    }

    async fn update(&self, id: RecipientId, input: UpdateRecipient) -> Result<Option<Recipient>> {
        let mut state = self.state.write().await;
        if state
            .recipients
            .values()
            .any(|r| r.id != id && r.email == input.email)
        {
            return Err(duplicate_email("recipients"));
        }

        let Some(recipient) = state.recipients.get_mut(&id) else {
            return Ok(None);
        };
        recipient.email = input.email;
        recipient.full_name = input.full_name;
        recipient.note = input.note;
        Ok(Some(recipient.clone()))
    }

    async fn delete(&self, id: RecipientId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.recipients.remove(&id).is_none() {
            return Ok(false);
        }
        for members in state.members.values_mut() {
            members.retain(|r| *r != id);
        }
        Ok(true)
    }

    async fn count_unique(&self) -> Result<i64> {
        let state = self.state.read().await;
        let unique: HashSet<String> = state
            .recipients
            .values()
            .map(|r| r.email.to_lowercase())
            .collect();
        Ok(unique.len() as i64)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        let message = Message {
            id: Uuid::now_v7(),
            title: input.title,
            content: input.content,
            owner_id: input.owner_id,
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .messages
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.state.read().await.messages.get(&id).cloned())
    }

    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .values()
            .filter(|m| owner_id.is_none() || m.owner_id == owner_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(messages)
    }

    async fn update(&self, id: MessageId, input: UpdateMessage) -> Result<Option<Message>> {
        let mut state = self.state.write().await;
        let Some(message) = state.messages.get_mut(&id) else {
            return Ok(None);
        };
        message.title = input.title;
        message.content = input.content;
        Ok(Some(message.clone()))
    }

    async fn delete(&self, id: MessageId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.messages.remove(&id).is_none() {
            return Ok(false);
        }
        let dependent: Vec<MailingId> = state
            .mailings
            .values()
            .filter(|m| m.message_id == id)
            .map(|m| m.id)
            .collect();
        for mailing_id in dependent {
            state.remove_mailing(mailing_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl MailingRepository for MemoryStore {
    async fn create(&self, input: CreateMailing) -> Result<Mailing> {
        let mut state = self.state.write().await;
        if !state.messages.contains_key(&input.message_id) {
            return Err(foreign_key("message", input.message_id));
        }
        let members = state.member_ids(&input.recipient_ids)?;

        let mailing = Mailing {
            id: Uuid::now_v7(),
            first_send_time: input.first_send_time,
            end_send_time: input.end_send_time,
            status: MailingStatus::Created.to_string(),
            message_id: input.message_id,
            owner_id: input.owner_id,
            is_blocked: false,
            created_at: Utc::now(),
        };
        state.members.insert(mailing.id, members);
        state.mailings.insert(mailing.id, mailing.clone());
        Ok(mailing)
    }

    async fn get(&self, id: MailingId) -> Result<Option<Mailing>> {
        Ok(self.state.read().await.mailings.get(&id).cloned())
    }

    async fn list(&self, owner_id: Option<UserId>) -> Result<Vec<Mailing>> {
        let state = self.state.read().await;
        let mut mailings: Vec<Mailing> = state
            .mailings
            .values()
            .filter(|m| owner_id.is_none() || m.owner_id == owner_id)
            .cloned()
            .collect();
        mailings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(mailings)
    }

    async fn update(&self, id: MailingId, input: UpdateMailing) -> Result<Option<Mailing>> {
        let mut state = self.state.write().await;
        if !state.mailings.contains_key(&id) {
            return Ok(None);
        }
        if !state.messages.contains_key(&input.message_id) {
            return Err(foreign_key("message", input.message_id));
        }
        let members = state.member_ids(&input.recipient_ids)?;
        state.members.insert(id, members);

        let Some(mailing) = state.mailings.get_mut(&id) else {
            return Ok(None);
        };
        mailing.message_id = input.message_id;
        mailing.first_send_time = input.first_send_time;
        mailing.end_send_time = input.end_send_time;
        Ok(Some(mailing.clone()))
    }

    async fn delete(&self, id: MailingId) -> Result<bool> {
        Ok(self.state.write().await.remove_mailing(id))
    }

    async fn recipients(&self, id: MailingId) -> Result<Vec<Recipient>> {
        let state = self.state.read().await;
        let mut recipients: Vec<Recipient> = state
            .members
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|r| state.recipients.get(r).cloned())
                    .collect()
            })
            .unwrap_or_default();
        recipients.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(recipients)
    }

    async fn count(&self, status: Option<MailingStatus>) -> Result<i64> {
        let state = self.state.read().await;
        let count = state
            .mailings
            .values()
            .filter(|m| status.map_or(true, |s| m.status == s.to_string()))
            .count();
        Ok(count as i64)
    }

    async fn claim_for_dispatch(&self, id: MailingId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(mailing) = state.mailings.get_mut(&id) else {
            return Ok(false);
        };
        if mailing.is_blocked || !advance(mailing, MailingStatus::Running) {
            return Ok(false);
        }

        mailing.first_send_time.get_or_insert_with(Utc::now);
        Ok(true)
    }

    async fn complete(&self, id: MailingId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(mailing) = state.mailings.get_mut(&id) else {
            return Ok(false);
        };
        if !advance(mailing, MailingStatus::Completed) {
            return Ok(false);
        }

        mailing.end_send_time.get_or_insert_with(Utc::now);
        Ok(true)
    }

    async fn set_blocked(&self, id: MailingId, blocked: bool) -> Result<Option<Mailing>> {
        let mut state = self.state.write().await;
        Ok(state.mailings.get_mut(&id).map(|mailing| {
            mailing.is_blocked = blocked;
            mailing.clone()
        }))
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn record(&self, input: NewDeliveryAttempt) -> Result<DeliveryAttempt> {
        let mut state = self.state.write().await;
        if !state.mailings.contains_key(&input.mailing_id) {
            return Err(foreign_key("mailing", input.mailing_id));
        }

        let attempt = DeliveryAttempt {
            id: Uuid::now_v7(),
            attempt_datetime: Utc::now(),
            status: input.status.to_string(),
            server_response: input.server_response,
            recipient_email: input.recipient_email,
            mailing_id: input.mailing_id,
            owner_id: input.owner_id,
        };
        state.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn list(
        &self,
        owner_id: Option<UserId>,
        mailing_id: Option<MailingId>,
    ) -> Result<Vec<DeliveryAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .rev()
            .filter(|a| owner_id.is_none() || a.owner_id == owner_id)
            .filter(|a| mailing_id.map_or(true, |m| a.mailing_id == m))
            .cloned()
            .collect())
    }

    async fn count_by_mailing(&self, mailing_id: MailingId) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.mailing_id == mailing_id)
            .count() as i64)
    }
}

#[async_trait]
impl StatisticsRepository for MemoryStore {
    async fn get_or_create(&self, user_id: UserId) -> Result<UserStatistics> {
        let mut state = self.state.write().await;
        Ok(state
            .statistics
            .entry(user_id)
            .or_insert_with(|| UserStatistics::empty(user_id))
            .clone())
    }

    async fn record_attempt(&self, user_id: UserId, success: bool) -> Result<UserStatistics> {
        let mut state = self.state.write().await;
        let stats = state
            .statistics
            .entry(user_id)
            .or_insert_with(|| UserStatistics::empty(user_id));
        stats.record(success);
        Ok(stats.clone())
    }
}
