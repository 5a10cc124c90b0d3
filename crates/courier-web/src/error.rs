//! Web error type
//!
//! Handlers return `WebError`; the error-page middleware in `routes` turns
//! the marker it leaves on the response into a rendered page.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use courier_common::Error;
use courier_core::DispatchError;
use thiserror::Error;
use tracing::error;

/// Marker carried by error responses until the page is rendered
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    App(#[from] Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl WebError {
    pub fn not_found(what: impl Into<String>) -> Self {
        WebError::App(Error::NotFound(what.into()))
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        WebError::App(Error::PermissionDenied(what.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        let code = match self {
            WebError::App(e) => e.status_code(),
            WebError::Dispatch(DispatchError::NotFound(_)) => 404,
            WebError::Dispatch(DispatchError::Storage(e)) => e.status_code(),
            WebError::Dispatch(_) => 500,
            WebError::Template(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_client_error() {
            self.to_string()
        } else {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        };

        (
            status,
            Extension(ErrorPage {
                message: message.clone(),
            }),
            message,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_mapping() {
        assert_eq!(WebError::not_found("mailing").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(WebError::forbidden("block").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            WebError::from(DispatchError::NotFound(uuid::Uuid::nil())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WebError::from(Error::Database("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let response = WebError::from(Error::Database("password=secret".into())).into_response();
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert_eq!(page.message, "Internal server error");
    }
}
