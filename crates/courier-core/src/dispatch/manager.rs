//! Mailing Manager - dispatch and block/unblock

use super::transport::{MailTransport, OutgoingEmail};
use crate::cache::EntityCaches;
use courier_common::types::{AttemptStatus, MailingId, MailingStatus, MessageId};
use courier_storage::models::{Mailing, NewDeliveryAttempt};
use courier_storage::Repositories;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Mailing not found: {0}")]
    NotFound(MailingId),

    #[error("Message {0} of the mailing not found")]
    MessageNotFound(MessageId),

    #[error("Mailing {0} has an unknown status: {1}")]
    InvalidStatus(MailingId, String),

    #[error(transparent)]
    Storage(#[from] courier_common::Error),
}

/// Summary of one dispatch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub mailing_id: MailingId,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: MailingStatus,
}

/// What a dispatch call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Recipients were processed
    Sent(DispatchReport),
    /// The mailing is blocked; nothing changed
    Blocked,
    /// The mailing had already left the created state; nothing changed
    AlreadyDispatched(MailingStatus),
}

/// Mailing Manager - runs dispatches and toggles the block flag
pub struct MailingManager {
    repos: Repositories,
    transport: Arc<dyn MailTransport>,
    from_address: String,
    caches: Arc<EntityCaches>,
}

impl MailingManager {
    pub fn new(
        repos: Repositories,
        transport: Arc<dyn MailTransport>,
        from_address: impl Into<String>,
        caches: Arc<EntityCaches>,
    ) -> Self {
        Self {
            repos,
            transport,
            from_address: from_address.into(),
            caches,
        }
    }

    /// Send a created, unblocked mailing to every bound recipient.
    ///
    /// Recipients are processed one at a time in email order. Each outcome
    /// is recorded as a delivery attempt and counted in the owner's
    /// statistics. The mailing completes only when every send succeeded.
    pub async fn dispatch(&self, mailing_id: MailingId) -> Result<DispatchOutcome, DispatchError> {
        let mailing = self.load(mailing_id).await?;

        if let Some(outcome) = Self::refusal(&mailing)? {
            return Ok(outcome);
        }

        let message = self
            .repos
            .messages
            .get(mailing.message_id)
            .await?
            .ok_or(DispatchError::MessageNotFound(mailing.message_id))?;
        let recipients = self.repos.mailings.recipients(mailing_id).await?;

        if !self.repos.mailings.claim_for_dispatch(mailing_id).await? {
            // Lost the claim; report whatever state won
            let current = self.load(mailing_id).await?;
            let outcome = Self::refusal(&current)?
                .unwrap_or(DispatchOutcome::AlreadyDispatched(MailingStatus::Running));
            debug!(mailing_id = %mailing_id, ?outcome, "Dispatch claim lost");
            return Ok(outcome);
        }
        self.caches.mailings.invalidate().await;

        info!(
            mailing_id = %mailing_id,
            recipients = recipients.len(),
            "Dispatching mailing"
        );

        let mut succeeded = 0;
        let mut failed = 0;

        for recipient in &recipients {
            let email = OutgoingEmail {
                from: self.from_address.clone(),
                to: vec![recipient.email.clone()],
                subject: message.title.clone(),
                body: message.content.clone(),
            };

            let (status, server_response) = match self.transport.send(&email).await {
                Ok(confirmation) => {
                    succeeded += 1;
                    (AttemptStatus::Success, confirmation)
                }
                Err(e) => {
                    warn!(
                        mailing_id = %mailing_id,
                        recipient = %recipient.email,
                        error = %e,
                        "Delivery failed"
                    );
                    failed += 1;
                    (AttemptStatus::Failure, e.to_string())
                }
            };

            self.repos
                .attempts
                .record(NewDeliveryAttempt {
                    mailing_id,
                    status,
                    server_response,
                    recipient_email: recipient.email.clone(),
                    owner_id: mailing.owner_id,
                })
                .await?;

            if let Some(owner_id) = mailing.owner_id {
                self.repos
                    .statistics
                    .record_attempt(owner_id, status == AttemptStatus::Success)
                    .await?;
            }
        }

        let status = if failed == 0 && self.repos.mailings.complete(mailing_id).await? {
            MailingStatus::Completed
        } else {
            MailingStatus::Running
        };
        self.caches.mailings.invalidate().await;

        info!(
            mailing_id = %mailing_id,
            succeeded,
            failed,
            status = %status,
            "Mailing dispatched"
        );

        Ok(DispatchOutcome::Sent(DispatchReport {
            mailing_id,
            attempted: recipients.len(),
            succeeded,
            failed,
            status,
        }))
    }

    /// Block a mailing so it cannot be dispatched
    pub async fn block(&self, mailing_id: MailingId) -> Result<Mailing, DispatchError> {
        self.set_blocked(mailing_id, true).await
    }

    /// Lift a block
    pub async fn unblock(&self, mailing_id: MailingId) -> Result<Mailing, DispatchError> {
        self.set_blocked(mailing_id, false).await
    }

    async fn set_blocked(&self, mailing_id: MailingId, blocked: bool) -> Result<Mailing, DispatchError> {
        let mailing = self
            .repos
            .mailings
            .set_blocked(mailing_id, blocked)
            .await?
            .ok_or(DispatchError::NotFound(mailing_id))?;
        self.caches.mailings.invalidate().await;

        info!(mailing_id = %mailing_id, blocked, "Mailing block flag updated");
        Ok(mailing)
    }

    async fn load(&self, mailing_id: MailingId) -> Result<Mailing, DispatchError> {
        self.repos
            .mailings
            .get(mailing_id)
            .await?
            .ok_or(DispatchError::NotFound(mailing_id))
    }

    /// The outcome for a mailing that must not be dispatched, if any
    fn refusal(mailing: &Mailing) -> Result<Option<DispatchOutcome>, DispatchError> {
        if mailing.is_blocked {
            warn!(mailing_id = %mailing.id, "Mailing is blocked; not dispatching");
            return Ok(Some(DispatchOutcome::Blocked));
        }

        match mailing.status_enum() {
            Some(status) if status.can_transition_to(MailingStatus::Running) => Ok(None),
            Some(status) => {
                info!(mailing_id = %mailing.id, status = %status, "Mailing already dispatched");
                Ok(Some(DispatchOutcome::AlreadyDispatched(status)))
            }
            None => Err(DispatchError::InvalidStatus(
                mailing.id,
                mailing.status.clone(),
            )),
        }
    }
}
