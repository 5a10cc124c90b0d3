//! Repository layer for data access

pub mod attempts;
pub mod mailings;
pub mod messages;
pub mod recipients;
pub mod sessions;
pub mod statistics;
pub mod users;

pub use attempts::{AttemptRepository, DbAttemptRepository};
pub use mailings::{DbMailingRepository, MailingRepository};
pub use messages::{DbMessageRepository, MessageRepository};
pub use recipients::{DbRecipientRepository, RecipientRepository};
pub use sessions::{DbSessionRepository, SessionRepository};
pub use statistics::{DbStatisticsRepository, StatisticsRepository};
pub use users::{DbUserRepository, UserRepository};
