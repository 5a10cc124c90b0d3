//! Dispatch Module - Sends mailings and records delivery attempts

mod manager;
mod transport;

pub use manager::{DispatchError, DispatchOutcome, DispatchReport, MailingManager};
pub use transport::{MailTransport, OutgoingEmail, ScriptedTransport, SmtpMailer, TransportError};
