//! Common types for Courier

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for recipients
pub type RecipientId = Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// Unique identifier for mailings
pub type MailingId = Uuid;

/// Unique identifier for delivery attempts
pub type AttemptId = Uuid;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (local, domain) = s.split_once('@')?;
        if local.is_empty()
            || domain.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || s.chars().any(char::is_whitespace)
        {
            return None;
        }
        Some(Self::new(local, domain.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation(format!("Invalid email address: {}", s)))
    }
}

/// Mailing lifecycle status
///
/// Status only ever advances `Created -> Running -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailingStatus {
    Created,
    Running,
    Completed,
}

impl MailingStatus {
    /// Whether a move from `self` to `next` is permitted
    pub fn can_transition_to(self, next: MailingStatus) -> bool {
        matches!(
            (self, next),
            (MailingStatus::Created, MailingStatus::Running)
                | (MailingStatus::Running, MailingStatus::Completed)
        )
    }

    /// Human-readable label for the UI
    pub fn label(self) -> &'static str {
        match self {
            MailingStatus::Created => "Created",
            MailingStatus::Running => "Running",
            MailingStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for MailingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailingStatus::Created => write!(f, "created"),
            MailingStatus::Running => write!(f, "running"),
            MailingStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for MailingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(MailingStatus::Created),
            "running" => Ok(MailingStatus::Running),
            "completed" => Ok(MailingStatus::Completed),
            _ => Err(format!("Invalid mailing status: {}", s)),
        }
    }
}

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failure,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::Success => write!(f, "success"),
            AttemptStatus::Failure => write!(f, "failure"),
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptStatus::Success),
            "failure" => Ok(AttemptStatus::Failure),
            _ => Err(format!("Invalid attempt status: {}", s)),
        }
    }
}

/// Permissions that widen what a user may see or do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewAllRecipients,
    ViewAllMessages,
    ViewAllMailings,
    ViewAllAttempts,
    BlockMailings,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::ViewAllRecipients,
        Permission::ViewAllMessages,
        Permission::ViewAllMailings,
        Permission::ViewAllAttempts,
        Permission::BlockMailings,
    ];
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::ViewAllRecipients => write!(f, "view_all_recipients"),
            Permission::ViewAllMessages => write!(f, "view_all_messages"),
            Permission::ViewAllMailings => write!(f, "view_all_mailings"),
            Permission::ViewAllAttempts => write!(f, "view_all_attempts"),
            Permission::BlockMailings => write!(f, "block_mailings"),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.to_string() == s)
            .ok_or_else(|| format!("Invalid permission: {}", s))
    }
}
