//! Mail transport - the outbound edge of the dispatch routine

use async_trait::async_trait;
use courier_common::config::SmtpConfig;
use courier_common::{Error, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, response::Response},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::collections::HashSet;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// A plain-text email ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    /// Reject header values that would let a caller inject extra headers
    pub fn check_headers(&self) -> std::result::Result<(), TransportError> {
        let headers = std::iter::once(("Subject", self.subject.as_str()))
            .chain(std::iter::once(("From", self.from.as_str())))
            .chain(self.to.iter().map(|t| ("To", t.as_str())));

        for (name, value) in headers {
            if value.contains(|c: char| c == '\r' || c == '\n') {
                return Err(TransportError::MalformedHeader(format!(
                    "{} header contains a line break",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Errors from a single send
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Outbound mail transport
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send one email, returning the server's confirmation text
    async fn send(&self, email: &OutgoingEmail) -> std::result::Result<String, TransportError>;
}

/// SMTP relay transport built from `SmtpConfig`
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the relay transport. Implicit TLS wins over STARTTLS; with
    /// neither the connection is plaintext.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::Transport(format!("Failed to create SMTP transport: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::Transport(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = transport
            .timeout(Some(StdDuration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self { mailer })
    }

    fn build_message(email: &OutgoingEmail) -> std::result::Result<Message, TransportError> {
        email.check_headers()?;

        let from: Mailbox = email
            .from
            .parse()
            .map_err(|e| TransportError::Address(format!("{}: {}", email.from, e)))?;

        let mut builder = Message::builder().from(from).subject(&email.subject);
        for to in &email.to {
            let to: Mailbox = to
                .parse()
                .map_err(|e| TransportError::Address(format!("{}: {}", to, e)))?;
            builder = builder.to(to);
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| TransportError::MalformedHeader(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> std::result::Result<String, TransportError> {
        let message = Self::build_message(email)?;

        let response = self
            .mailer
            .send(message)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        debug!("Email sent: {:?}", response);
        Ok(confirmation(&response))
    }
}

/// Server reply as stored on a successful attempt, e.g. `250 OK queued`
fn confirmation(response: &Response) -> String {
    let text = response.message().collect::<Vec<_>>().join(" ");
    format!("{} {}", response.code(), text).trim().to_string()
}

/// In-process transport that records every send and fails for chosen
/// addresses. Dispatch and web tests send through it.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    failing: HashSet<String>,
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to `address` fail with an SMTP rejection
    pub fn failing_for(mut self, address: impl Into<String>) -> Self {
        self.failing.insert(address.into());
        self
    }

    /// Every email handed to the transport so far, in order
    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(&self, email: &OutgoingEmail) -> std::result::Result<String, TransportError> {
        email.check_headers()?;
        self.sent.lock().await.push(email.clone());

        if let Some(to) = email.to.iter().find(|t| self.failing.contains(*t)) {
            return Err(TransportError::Smtp(format!(
                "permanent error (550): mailbox unavailable: {}",
                to
            )));
        }
        Ok("250 OK: queued".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn email(subject: &str, to: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: "news@example.com".to_string(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            body: "Hello".to_string(),
        }
    }

    #[test]
    fn test_header_injection_rejected() {
        let bad = email("Hi\r\nBcc: victim@example.com", "a@example.com");
        assert!(matches!(
            bad.check_headers(),
            Err(TransportError::MalformedHeader(_))
        ));
        assert!(email("Hi", "a@example.com").check_headers().is_ok());
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let err = SmtpMailer::build_message(&email("Hi", "not-an-address")).unwrap_err();
        assert!(matches!(err, TransportError::Address(_)));
        assert!(SmtpMailer::build_message(&email("Hi", "a@example.com")).is_ok());
    }

    #[test]
    fn test_confirmation_text() {
        use lettre::transport::smtp::response::{Category, Code, Detail, Severity};

        let ok = || Code::new(Severity::PositiveCompletion, Category::MailSystem, Detail::Zero);
        let response = Response::new(ok(), vec!["2.0.0 Ok:".to_string(), "queued as 4F2".to_string()]);
        assert_eq!(confirmation(&response), "250 2.0.0 Ok: queued as 4F2");

        let bare = Response::new(ok(), Vec::new());
        assert_eq!(confirmation(&bare), "250");
    }

    #[tokio::test]
    async fn test_smtp_mailer_from_config() {
        let config = SmtpConfig {
            use_starttls: false,
            ..SmtpConfig::default()
        };
        assert!(SmtpMailer::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_scripted_transport() {
        let transport = ScriptedTransport::new().failing_for("bad@example.com");

        assert_eq!(
            transport.send(&email("Hi", "a@example.com")).await,
            Ok("250 OK: queued".to_string())
        );
        assert!(matches!(
            transport.send(&email("Hi", "bad@example.com")).await,
            Err(TransportError::Smtp(_))
        ));
        assert!(transport.send(&email("a\nb", "a@example.com")).await.is_err());
        assert_eq!(transport.sent().await.len(), 2);
    }
}
