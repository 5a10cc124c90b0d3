//! Database models

use chrono::{DateTime, Utc};
use courier_common::types::{
    AttemptId, AttemptStatus, MailingId, MailingStatus, MessageId, Permission, RecipientId,
    UserId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub permissions: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Get permissions as a vector, ignoring unknown names
    pub fn permissions_vec(&self) -> Vec<Permission> {
        serde_json::from_value::<Vec<String>>(self.permissions.clone())
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect()
    }

    /// Check a permission; superusers hold every permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.is_superuser || self.permissions_vec().contains(&permission)
    }
}

/// Create user input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub is_superuser: bool,
}

/// Session model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session is past its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Recipient model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub email: String,
    pub full_name: String,
    pub note: String,
    pub owner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Create recipient input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecipient {
    pub email: String,
    pub full_name: String,
    pub note: String,
    pub owner_id: Option<UserId>,
}

/// Update recipient input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecipient {
    pub email: String,
    pub full_name: String,
    pub note: String,
}

/// Message model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub title: String,
    pub content: String,
    pub owner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub title: String,
    pub content: String,
    pub owner_id: Option<UserId>,
}

/// Update message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub title: String,
    pub content: String,
}

/// Mailing model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Mailing {
    pub id: MailingId,
    pub first_send_time: Option<DateTime<Utc>>,
    pub end_send_time: Option<DateTime<Utc>>,
    pub status: String,
    pub message_id: MessageId,
    pub owner_id: Option<UserId>,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Mailing {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MailingStatus> {
        self.status.parse().ok()
    }
}

/// Create mailing input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMailing {
    pub message_id: MessageId,
    pub recipient_ids: Vec<RecipientId>,
    pub first_send_time: Option<DateTime<Utc>>,
    pub end_send_time: Option<DateTime<Utc>>,
    pub owner_id: Option<UserId>,
}

/// Update mailing input; status and block flag are not editable here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMailing {
    pub message_id: MessageId,
    pub recipient_ids: Vec<RecipientId>,
    pub first_send_time: Option<DateTime<Utc>>,
    pub end_send_time: Option<DateTime<Utc>>,
}

/// Delivery attempt model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: AttemptId,
    pub attempt_datetime: DateTime<Utc>,
    pub status: String,
    pub server_response: String,
    pub recipient_email: String,
    pub mailing_id: MailingId,
    pub owner_id: Option<UserId>,
}

impl DeliveryAttempt {
    /// Get status enum
    pub fn status_enum(&self) -> Option<AttemptStatus> {
        self.status.parse().ok()
    }
}

/// New delivery attempt input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeliveryAttempt {
    pub mailing_id: MailingId,
    pub status: AttemptStatus,
    pub server_response: String,
    pub recipient_email: String,
    pub owner_id: Option<UserId>,
}

/// Per-user delivery statistics
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: UserId,
    pub total_mailings: i64,
    pub successful_mailings: i64,
    pub failed_mailings: i64,
}

impl UserStatistics {
    /// Zeroed statistics for a user
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            total_mailings: 0,
            successful_mailings: 0,
            failed_mailings: 0,
        }
    }

    /// Count one attempt
    pub fn record(&mut self, success: bool) {
        self.total_mailings += 1;
        if success {
            self.successful_mailings += 1;
        } else {
            self.failed_mailings += 1;
        }
    }

    /// Percentage of successful attempts
    pub fn success_rate(&self) -> f64 {
        if self.total_mailings == 0 {
            0.0
        } else {
            (self.successful_mailings as f64 / self.total_mailings as f64) * 100.0
        }
    }
}

/// Dashboard counters for the home page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub total_mailings: i64,
    pub active_mailings: i64,
    pub unique_recipients: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user(permissions: serde_json::Value, is_superuser: bool) -> User {
        User {
            id: uuid::Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            username: None,
            password_hash: String::new(),
            phone_number: None,
            country: None,
            is_active: true,
            is_superuser,
            permissions,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_permissions() {
        let u = user(serde_json::json!(["view_all_mailings", "bogus"]), false);
        assert_eq!(u.permissions_vec(), vec![Permission::ViewAllMailings]);
        assert!(u.has_permission(Permission::ViewAllMailings));
        assert!(!u.has_permission(Permission::BlockMailings));

        let admin = user(serde_json::json!([]), true);
        assert!(admin.has_permission(Permission::BlockMailings));
    }

    #[test]
    fn test_statistics_record() {
        let mut stats = UserStatistics::empty(uuid::Uuid::new_v4());
        stats.record(true);
        stats.record(true);
        stats.record(false);
        assert_eq!(stats.total_mailings, 3);
        assert_eq!(stats.successful_mailings, 2);
        assert_eq!(stats.failed_mailings, 1);
        assert_eq!(
            stats.total_mailings,
            stats.successful_mailings + stats.failed_mailings
        );
        assert!((stats.success_rate() - 66.666).abs() < 0.01);
    }
}
