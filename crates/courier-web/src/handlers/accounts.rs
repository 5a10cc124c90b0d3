//! Registration, login and logout

use super::{page, page_with_status};
use crate::auth::{
    hash_password, removal_cookie, safe_next, session_cookie, verify_password, MaybeUser,
};
use crate::error::WebError;
use crate::forms::{LoginForm, RegisterForm};
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::CookieJar;
use chrono::Duration;
use courier_common::Error;
use courier_core::OutgoingEmail;
use courier_storage::models::{CreateUser, User};
use minijinja::context;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Registration page
pub async fn register_page(State(state): State<AppState>) -> Result<Response, WebError> {
    page(
        &state,
        "register.html",
        context! { form => RegisterForm::default(), errors => Vec::<String>::new() },
    )
}

/// Registration form submission
pub async fn register_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, WebError> {
    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return page_with_status(
                &state,
                StatusCode::UNPROCESSABLE_ENTITY,
                "register.html",
                context! { form => form, errors => errors },
            )
        }
    };

    let created = state
        .repos
        .users
        .create(CreateUser {
            email: valid.email,
            username: valid.username,
            password_hash: hash_password(&valid.password)?,
            phone_number: valid.phone_number,
            country: valid.country,
            is_superuser: false,
        })
        .await;

    let user = match created {
        Ok(user) => user,
        Err(Error::Conflict(_)) => {
            return page_with_status(
                &state,
                StatusCode::UNPROCESSABLE_ENTITY,
                "register.html",
                context! {
                    form => form,
                    errors => vec!["A user with this email already exists."],
                },
            )
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, "User registered");
    send_welcome(&state, &user).await;

    let jar = start_session(&state, jar, &user).await?;
    Ok((jar, Redirect::to("/")).into_response())
}

/// Login page
pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<NextQuery>,
) -> Result<Response, WebError> {
    let form = LoginForm {
        next: query.next,
        ..LoginForm::default()
    };
    page(
        &state,
        "login.html",
        context! { form => form, errors => Vec::<String>::new() },
    )
}

/// Login form submission
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let user = state.repos.users.get_by_email(form.email.trim()).await?;

    let user = match user {
        Some(user) if user.is_active && verify_password(&form.password, &user.password_hash) => {
            user
        }
        _ => {
            warn!("Failed login attempt for: {}", form.email);
            let form = LoginForm {
                password: String::new(),
                ..form
            };
            return page_with_status(
                &state,
                StatusCode::UNAUTHORIZED,
                "login.html",
                context! {
                    form => form,
                    errors => vec!["Please enter a correct email and password."],
                },
            );
        }
    };

    info!(user_id = %user.id, "User logged in");
    let jar = start_session(&state, jar, &user).await?;
    let next = safe_next(form.next.as_deref()).to_string();
    Ok((jar, Redirect::to(&next)).into_response())
}

/// Logout handler
pub async fn logout(
    State(state): State<AppState>,
    user: MaybeUser,
    jar: CookieJar,
) -> Result<Response, WebError> {
    if let Some(auth) = user.0 {
        state.repos.sessions.delete(&auth.session_id).await?;
        info!(user_id = %auth.user_id(), "User logged out");
    }
    Ok((jar.remove(removal_cookie()), Redirect::to("/login")).into_response())
}

async fn start_session(state: &AppState, jar: CookieJar, user: &User) -> Result<CookieJar, WebError> {
    let ttl = Duration::hours(state.config.web.session_ttl_hours);
    let session = state.repos.sessions.create(user.id, ttl).await?;
    Ok(jar.add(session_cookie(state, session.id)))
}

/// Greet a new user; a failed send does not undo the registration
async fn send_welcome(state: &AppState, user: &User) {
    let name = user.username.as_deref().unwrap_or(&user.email);
    let email = OutgoingEmail {
        from: state.config.smtp.from_address.clone(),
        to: vec![user.email.clone()],
        subject: "Welcome to Courier".to_string(),
        body: format!(
            "Hello, {}!\n\nYour Courier account has been created. You can now add recipients, \
             write messages and start mailings.\n",
            name
        ),
    };

    if let Err(e) = state.transport.send(&email).await {
        warn!(user_id = %user.id, error = %e, "Failed to send welcome email");
    }
}
