//! Form payloads and their validation

use chrono::{DateTime, NaiveDateTime, Utc};
use courier_common::types::{EmailAddress, MessageId, RecipientId};
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_LEN: usize = 150;
pub const MAX_NAME_LEN: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Field errors collected while validating a form
#[derive(Debug, Default, Clone, Serialize)]
pub struct FormErrors(Vec<String>);

impl FormErrors {
    pub fn add(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

fn normalize_email(raw: &str, errors: &mut FormErrors) -> String {
    match EmailAddress::parse(raw) {
        Some(email) => email.to_string(),
        None => {
            errors.add("Enter a valid email address.");
            raw.trim().to_string()
        }
    }
}

/// Parse a `datetime-local` input as UTC; empty means unset
pub fn parse_datetime_local(raw: &str) -> Result<Option<DateTime<Utc>>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| format!("Invalid date and time: {}", raw))
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RegisterForm {
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub country: String,
    #[serde(skip_serializing)]
    pub password1: String,
    #[serde(skip_serializing)]
    pub password2: String,
}

/// A registration that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    pub email: String,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub password: String,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl RegisterForm {
    pub fn validate(&self) -> Result<ValidRegistration, FormErrors> {
        let mut errors = FormErrors::default();
        let email = normalize_email(&self.email, &mut errors);

        if self.password1 != self.password2 {
            errors.add("The two password fields didn't match.");
        }
        if self.password1.chars().count() < MIN_PASSWORD_LEN {
            errors.add(format!(
                "Password must be at least {} characters long.",
                MIN_PASSWORD_LEN
            ));
        }

        let phone_number = non_empty(&self.phone_number);
        if let Some(phone) = &phone_number {
            if !phone.chars().all(|c| c.is_ascii_digit()) {
                errors.add("Phone number must contain digits only.");
            }
        }

        errors.into_result(ValidRegistration {
            email,
            username: non_empty(&self.username),
            phone_number,
            country: non_empty(&self.country),
            password: self.password1.clone(),
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RecipientForm {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub note: String,
}

impl RecipientForm {
    pub fn validate(&self) -> Result<RecipientForm, FormErrors> {
        let mut errors = FormErrors::default();
        let email = normalize_email(&self.email, &mut errors);
        let full_name = self.full_name.trim().to_string();

        if full_name.is_empty() {
            errors.add("Full name is required.");
        } else if full_name.chars().count() > MAX_NAME_LEN {
            errors.add(format!("Full name must be at most {} characters.", MAX_NAME_LEN));
        }

        errors.into_result(RecipientForm {
            email,
            full_name,
            note: self.note.trim().to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct MessageForm {
    pub title: String,
    pub content: String,
}

impl MessageForm {
    pub fn validate(&self) -> Result<MessageForm, FormErrors> {
        let mut errors = FormErrors::default();
        let title = self.title.trim().to_string();

        if title.is_empty() {
            errors.add("Title is required.");
        } else if title.chars().count() > MAX_TITLE_LEN {
            errors.add(format!("Title must be at most {} characters.", MAX_TITLE_LEN));
        }
        if self.content.trim().is_empty() {
            errors.add("Content is required.");
        }

        errors.into_result(MessageForm {
            title,
            content: self.content.clone(),
        })
    }
}

/// Mailing form; `recipients` arrives as repeated keys from a multi-select
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct MailingForm {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub first_send_time: String,
    #[serde(default)]
    pub end_send_time: String,
}

/// A mailing form that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidMailing {
    pub message_id: MessageId,
    pub recipient_ids: Vec<RecipientId>,
    pub first_send_time: Option<DateTime<Utc>>,
    pub end_send_time: Option<DateTime<Utc>>,
}

impl MailingForm {
    /// Validate against the messages and recipients the user may choose
    pub fn validate(
        &self,
        allowed_messages: &[MessageId],
        allowed_recipients: &[RecipientId],
    ) -> Result<ValidMailing, FormErrors> {
        let mut errors = FormErrors::default();

        let message_id = match self.message_id.parse::<MessageId>() {
            Ok(id) if allowed_messages.contains(&id) => Some(id),
            _ => {
                errors.add("Select a message.");
                None
            }
        };

        let mut recipient_ids = Vec::with_capacity(self.recipients.len());
        for raw in &self.recipients {
            match raw.parse::<RecipientId>() {
                Ok(id) if allowed_recipients.contains(&id) => {
                    if !recipient_ids.contains(&id) {
                        recipient_ids.push(id);
                    }
                }
                _ => errors.add(format!("Unknown recipient: {}", raw)),
            }
        }

        let first_send_time = parse_datetime_local(&self.first_send_time).unwrap_or_else(|e| {
            errors.add(e);
            None
        });
        let end_send_time = parse_datetime_local(&self.end_send_time).unwrap_or_else(|e| {
            errors.add(e);
            None
        });
        if let (Some(first), Some(end)) = (first_send_time, end_send_time) {
            if end < first {
                errors.add("End time must not be before the first send time.");
            }
        }

        match message_id {
            Some(message_id) if errors.is_empty() => Ok(ValidMailing {
                message_id,
                recipient_ids,
                first_send_time,
                end_send_time,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BlockForm {
    /// Checkbox value; present only when ticked
    #[serde(default)]
    pub is_blocked: Option<String>,
}

impl BlockForm {
    pub fn blocked(&self) -> bool {
        self.is_blocked.is_some()
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AttemptFilter {
    #[serde(default)]
    pub mailing: Option<String>,
}

impl AttemptFilter {
    /// The selected mailing; blank or malformed values mean no filter
    pub fn mailing_id(&self) -> Option<uuid::Uuid> {
        self.mailing.as_deref().and_then(|m| m.trim().parse().ok())
    }
}
