//! Courier Core - mailing dispatch and supporting services
//!
//! This crate provides the dispatch routine that delivers a mailing to its
//! recipients, the SMTP mail transport, block/unblock, and the list cache
//! shared by the web UI.

pub mod cache;
pub mod dispatch;

pub use cache::{CacheScope, EntityCaches, ListCache};
pub use dispatch::{
    DispatchError, DispatchOutcome, DispatchReport, MailTransport, MailingManager, OutgoingEmail,
    ScriptedTransport, SmtpMailer, TransportError,
};
