//! Authentication module
//!
//! Sessions live server-side; the browser holds only the opaque token in an
//! HTTP-only cookie. `AuthContext` is the extractor every protected page
//! takes.

use crate::error::WebError;
use crate::AppState;
use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Uri;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use courier_common::types::{Permission, UserId};
use courier_common::Error;
use courier_storage::models::User;
use serde::Serialize;
use tracing::{debug, warn};

/// Session cookie name
pub const SESSION_COOKIE: &str = "courier_session";

/// Hash a password into a PHC string
pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored PHC string
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .ok()
        .and_then(|parsed_hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .ok()
        })
        .is_some()
}

/// Build the session cookie for a freshly created session
pub fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.web.secure_cookies)
        .max_age(time::Duration::hours(state.config.web.session_ttl_hours))
        .build()
}

/// Cookie that clears the session on logout
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// Only same-site absolute paths are followed after login
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

/// Login URL that returns to `uri` afterwards, query string included
pub fn login_redirect(uri: &Uri) -> String {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    serde_urlencoded::to_string(&[("next", target)])
        .map(|query| format!("/login?{}", query))
        .unwrap_or_else(|_| "/login".to_string())
}

/// The logged-in user
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session_id: String,
}

/// What templates know about the viewer
#[derive(Debug, Clone, Serialize)]
pub struct Viewer {
    pub email: String,
    pub username: Option<String>,
    pub is_superuser: bool,
    pub can_block: bool,
}

impl AuthContext {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.user.has_permission(permission)
    }

    /// Owners and superusers may change a row
    pub fn can_manage(&self, owner_id: Option<UserId>) -> bool {
        self.user.is_superuser || owner_id == Some(self.user.id)
    }

    /// Whether the viewer may see a row owned by `owner_id`
    pub fn can_view(&self, owner_id: Option<UserId>, view_all: Permission) -> bool {
        self.can_manage(owner_id) || self.has_permission(view_all)
    }

    pub fn viewer(&self) -> Viewer {
        Viewer {
            email: self.user.email.clone(),
            username: self.user.username.clone(),
            is_superuser: self.user.is_superuser,
            can_block: self.has_permission(Permission::BlockMailings),
        }
    }

    async fn from_parts(parts: &Parts, state: &AppState) -> Result<Option<Self>, WebError> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Ok(None);
        };
        if token.is_empty() {
            return Ok(None);
        }

        let Some(session) = state.repos.sessions.get(&token).await? else {
            debug!("Unknown or expired session");
            return Ok(None);
        };
        let Some(user) = state.repos.users.get(session.user_id).await? else {
            return Ok(None);
        };
        if !user.is_active {
            warn!(user_id = %user.id, "Inactive user presented a session");
            return Ok(None);
        }

        Ok(Some(Self {
            user,
            session_id: session.id,
        }))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Self::from_parts(parts, state).await {
            Ok(Some(auth)) => Ok(auth),
            Ok(None) => {
                Err(Redirect::to(&login_redirect(&parts.uri)).into_response())
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

/// The logged-in user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthContext>);

impl MaybeUser {
    pub fn viewer(&self) -> Option<Viewer> {
        self.0.as_ref().map(AuthContext::viewer)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        AuthContext::from_parts(parts, state)
            .await
            .map(MaybeUser)
            .map_err(IntoResponse::into_response)
    }
}

/// Check that the user owns the row (or is a superuser)
pub fn require_owner(auth: &AuthContext, owner_id: Option<UserId>) -> Result<(), WebError> {
    if !auth.can_manage(owner_id) {
        warn!(user_id = %auth.user_id(), "Ownership check failed");
        return Err(WebError::forbidden("you do not own this record"));
    }
    Ok(())
}

/// Check that the user may view the row
pub fn require_view(
    auth: &AuthContext,
    owner_id: Option<UserId>,
    view_all: Permission,
) -> Result<(), WebError> {
    if !auth.can_view(owner_id, view_all) {
        warn!(user_id = %auth.user_id(), permission = %view_all, "View check failed");
        return Err(WebError::forbidden("you cannot view this record"));
    }
    Ok(())
}

/// Check that the user holds a permission
pub fn require_permission(auth: &AuthContext, permission: Permission) -> Result<(), WebError> {
    if !auth.has_permission(permission) {
        warn!(
            "Permission denied: user {} lacks '{}'",
            auth.user_id(),
            permission
        );
        return Err(WebError::forbidden(format!("missing permission {}", permission)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/mailings")), "/mailings");
        assert_eq!(safe_next(Some("//evil.example.com")), "/");
        assert_eq!(safe_next(Some("https://evil.example.com")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn test_login_redirect_keeps_query() {
        let uri: Uri = "/attempts?mailing=42&x=a%20b".parse().unwrap();
        assert_eq!(
            login_redirect(&uri),
            "/login?next=%2Fattempts%3Fmailing%3D42%26x%3Da%2520b"
        );

        let uri: Uri = "/mailings".parse().unwrap();
        assert_eq!(login_redirect(&uri), "/login?next=%2Fmailings");
    }
}
