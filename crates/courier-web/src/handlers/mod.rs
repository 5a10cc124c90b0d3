//! Web UI Handlers
//!
//! Request handlers for the web UI.

pub mod accounts;
pub mod assets;
pub mod attempts;
pub mod home;
pub mod mailings;
pub mod messages;
pub mod recipients;
pub mod statistics;

use crate::error::WebError;
use crate::AppState;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use minijinja::Value;

/// Render a template into a 200 response
pub(crate) fn page(state: &AppState, name: &str, context: Value) -> Result<Response, WebError> {
    page_with_status(state, StatusCode::OK, name, context)
}

/// Render a template with an explicit status, e.g. a form with errors
pub(crate) fn page_with_status(
    state: &AppState,
    status: StatusCode,
    name: &str,
    context: Value,
) -> Result<Response, WebError> {
    let html = state.templates.render(name, context)?;
    Ok((status, Html(html)).into_response())
}
