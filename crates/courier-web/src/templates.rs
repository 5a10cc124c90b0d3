//! Template Engine
//!
//! Handles HTML template rendering using minijinja. Templates are compiled
//! into the binary; names ending in `.html` are auto-escaped.

use chrono::{DateTime, Utc};
use minijinja::{Environment, Error as MiniJinjaError, Value};
use serde::Serialize;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("error.html", include_str!("../templates/error.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("confirm_delete.html", include_str!("../templates/confirm_delete.html")),
    ("recipient_list.html", include_str!("../templates/recipient_list.html")),
    ("recipient_detail.html", include_str!("../templates/recipient_detail.html")),
    ("recipient_form.html", include_str!("../templates/recipient_form.html")),
    ("message_list.html", include_str!("../templates/message_list.html")),
    ("message_detail.html", include_str!("../templates/message_detail.html")),
    ("message_form.html", include_str!("../templates/message_form.html")),
    ("mailing_list.html", include_str!("../templates/mailing_list.html")),
    ("mailing_detail.html", include_str!("../templates/mailing_detail.html")),
    ("mailing_form.html", include_str!("../templates/mailing_form.html")),
    ("mailing_start.html", include_str!("../templates/mailing_start.html")),
    ("mailing_block.html", include_str!("../templates/mailing_block.html")),
    ("attempt_list.html", include_str!("../templates/attempt_list.html")),
    ("statistics.html", include_str!("../templates/statistics.html")),
];

/// Template manager
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Create a new template manager
    pub fn new() -> Result<Self, MiniJinjaError> {
        let mut env = Environment::new();

        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        env.add_filter("datetime", datetime);
        env.add_filter("datetime_local", datetime_local);

        Ok(Self { env })
    }

    /// Render a template with context
    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String, MiniJinjaError> {
        let template = self.env.get_template(name)?;
        template.render(context)
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// `2024-03-01 09:30` for display; empty for missing values
fn datetime(value: Value) -> String {
    parse_timestamp(&value)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// `2024-03-01T09:30` for `datetime-local` inputs
fn datetime_local(value: Value) -> String {
    parse_timestamp(&value)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_default()
}
