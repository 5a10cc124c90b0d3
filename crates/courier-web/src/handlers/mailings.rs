//! Mailing handlers, including start and block

use super::{page, page_with_status};
use crate::auth::{require_owner, require_permission, require_view, AuthContext};
use crate::error::WebError;
use crate::forms::{BlockForm, FormErrors, MailingForm};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use courier_common::types::{MailingId, MailingStatus, Permission};
use courier_core::{CacheScope, DispatchOutcome};
use courier_storage::models::{
    CreateMailing, Mailing, Message, Recipient, UpdateMailing,
};
use minijinja::context;
use serde::Serialize;
use tracing::info;

/// A mailing with what the list and detail pages show next to it
#[derive(Debug, Serialize)]
struct MailingView {
    #[serde(flatten)]
    mailing: Mailing,
    title: String,
    status_label: &'static str,
    startable: bool,
}

impl MailingView {
    async fn build(state: &AppState, mailing: Mailing) -> Result<Self, WebError> {
        let title = state
            .repos
            .messages
            .get(mailing.message_id)
            .await?
            .map(|m| m.title)
            .unwrap_or_default();
        let status = mailing.status_enum();

        Ok(Self {
            title,
            status_label: status.map(MailingStatus::label).unwrap_or("Unknown"),
            startable: status == Some(MailingStatus::Created) && !mailing.is_blocked,
            mailing,
        })
    }
}

async fn load(state: &AppState, id: MailingId) -> Result<Mailing, WebError> {
    state
        .repos
        .mailings
        .get(id)
        .await?
        .ok_or_else(|| WebError::not_found(format!("mailing {}", id)))
}

/// Messages and recipients the user may put into a mailing
async fn choices(
    state: &AppState,
    auth: &AuthContext,
) -> Result<(Vec<Message>, Vec<Recipient>), WebError> {
    let message_scope = CacheScope::for_viewer(
        auth.user_id(),
        auth.has_permission(Permission::ViewAllMessages),
    );
    let recipient_scope = CacheScope::for_viewer(
        auth.user_id(),
        auth.has_permission(Permission::ViewAllRecipients),
    );

    let messages_repo = state.repos.messages.clone();
    let messages = state
        .caches
        .messages
        .get_or_load(message_scope, || async move {
            messages_repo.list(message_scope.owner_filter()).await
        })
        .await?;

    let recipients_repo = state.repos.recipients.clone();
    let recipients = state
        .caches
        .recipients
        .get_or_load(recipient_scope, || async move {
            recipients_repo.list(recipient_scope.owner_filter()).await
        })
        .await?;

    Ok((messages, recipients))
}

async fn form_page(
    state: &AppState,
    auth: &AuthContext,
    status: StatusCode,
    action: String,
    form: &MailingForm,
    errors: FormErrors,
) -> Result<Response, WebError> {
    let (messages, recipients) = choices(state, auth).await?;
    page_with_status(
        state,
        status,
        "mailing_form.html",
        context! {
            user => auth.viewer(),
            action => action,
            form => form,
            errors => errors,
            messages => messages,
            recipients => recipients,
        },
    )
}

/// Validate a submitted mailing form against the user's choices
async fn validate(
    state: &AppState,
    auth: &AuthContext,
    form: &MailingForm,
) -> Result<Result<crate::forms::ValidMailing, FormErrors>, WebError> {
    let (messages, recipients) = choices(state, auth).await?;
    let message_ids: Vec<_> = messages.iter().map(|m| m.id).collect();
    let recipient_ids: Vec<_> = recipients.iter().map(|r| r.id).collect();
    Ok(form.validate(&message_ids, &recipient_ids))
}

pub async fn list(State(state): State<AppState>, auth: AuthContext) -> Result<Response, WebError> {
    let scope = CacheScope::for_viewer(
        auth.user_id(),
        auth.has_permission(Permission::ViewAllMailings),
    );
    let repo = state.repos.mailings.clone();
    let mailings = state
        .caches
        .mailings
        .get_or_load(scope, || async move { repo.list(scope.owner_filter()).await })
        .await?;

    let mut views = Vec::with_capacity(mailings.len());
    for mailing in mailings {
        views.push(MailingView::build(&state, mailing).await?);
    }

    page(
        &state,
        "mailing_list.html",
        context! { user => auth.viewer(), mailings => views },
    )
}

pub async fn new_page(State(state): State<AppState>, auth: AuthContext) -> Result<Response, WebError> {
    form_page(
        &state,
        &auth,
        StatusCode::OK,
        "/mailings/new".to_string(),
        &MailingForm::default(),
        FormErrors::default(),
    )
    .await
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    axum_extra::extract::Form(form): axum_extra::extract::Form<MailingForm>,
) -> Result<Response, WebError> {
    let action = "/mailings/new".to_string();
    let valid = match validate(&state, &auth, &form).await? {
        Ok(valid) => valid,
        Err(errors) => {
            return form_page(&state, &auth, StatusCode::UNPROCESSABLE_ENTITY, action, &form, errors)
                .await
        }
    };

    let mailing = state
        .repos
        .mailings
        .create(CreateMailing {
            message_id: valid.message_id,
            recipient_ids: valid.recipient_ids,
            first_send_time: valid.first_send_time,
            end_send_time: valid.end_send_time,
            owner_id: Some(auth.user_id()),
        })
        .await?;
    state.caches.mailings.invalidate().await;

    info!(mailing_id = %mailing.id, user_id = %auth.user_id(), "Mailing created");
    Ok(Redirect::to(&format!("/mailings/{}", mailing.id)).into_response())
}

pub async fn detail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
) -> Result<Response, WebError> {
    let mailing = load(&state, id).await?;
    require_view(&auth, mailing.owner_id, Permission::ViewAllMailings)?;

    let can_manage = auth.can_manage(mailing.owner_id);
    let recipients = state.repos.mailings.recipients(id).await?;
    let attempt_count = state.repos.attempts.count_by_mailing(id).await?;
    let view = MailingView::build(&state, mailing).await?;

    page(
        &state,
        "mailing_detail.html",
        context! {
            user => auth.viewer(),
            mailing => view,
            recipients => recipients,
            attempt_count => attempt_count,
            can_manage => can_manage,
        },
    )
}

pub async fn edit_page(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
) -> Result<Response, WebError> {
    let mailing = load(&state, id).await?;
    require_owner(&auth, mailing.owner_id)?;

    let recipients = state.repos.mailings.recipients(id).await?;
    let as_input = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%dT%H:%M").to_string())
            .unwrap_or_default()
    };
    let form = MailingForm {
        message_id: mailing.message_id.to_string(),
        recipients: recipients.iter().map(|r| r.id.to_string()).collect(),
        first_send_time: as_input(mailing.first_send_time),
        end_send_time: as_input(mailing.end_send_time),
    };

    form_page(
        &state,
        &auth,
        StatusCode::OK,
        format!("/mailings/{}/edit", id),
        &form,
        FormErrors::default(),
    )
    .await
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
    axum_extra::extract::Form(form): axum_extra::extract::Form<MailingForm>,
) -> Result<Response, WebError> {
    let mailing = load(&state, id).await?;
    require_owner(&auth, mailing.owner_id)?;

    let action = format!("/mailings/{}/edit", id);
    let valid = match validate(&state, &auth, &form).await? {
        Ok(valid) => valid,
        Err(errors) => {
            return form_page(&state, &auth, StatusCode::UNPROCESSABLE_ENTITY, action, &form, errors)
                .await
        }
    };

    state
        .repos
        .mailings
        .update(
            id,
            UpdateMailing {
                message_id: valid.message_id,
                recipient_ids: valid.recipient_ids,
                first_send_time: valid.first_send_time,
                end_send_time: valid.end_send_time,
            },
        )
        .await?
        .ok_or_else(|| WebError::not_found(format!("mailing {}", id)))?;
    state.caches.mailings.invalidate().await;

    info!(mailing_id = %id, "Mailing updated");
    Ok(Redirect::to(&format!("/mailings/{}", id)).into_response())
}

pub async fn delete_page(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
) -> Result<Response, WebError> {
    let mailing = load(&state, id).await?;
    require_owner(&auth, mailing.owner_id)?;
    let view = MailingView::build(&state, mailing).await?;

    page(
        &state,
        "confirm_delete.html",
        context! {
            user => auth.viewer(),
            kind => "mailing",
            name => view.title,
            warning => "Its delivery attempts are deleted with it.",
            action => format!("/mailings/{}/delete", id),
            cancel => format!("/mailings/{}", id),
        },
    )
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
) -> Result<Response, WebError> {
    let mailing = load(&state, id).await?;
    require_owner(&auth, mailing.owner_id)?;

    if !state.repos.mailings.delete(id).await? {
        return Err(WebError::not_found(format!("mailing {}", id)));
    }
    state.caches.mailings.invalidate().await;

    info!(mailing_id = %id, user_id = %auth.user_id(), "Mailing deleted");
    Ok(Redirect::to("/mailings").into_response())
}

async fn start_page(
    state: &AppState,
    auth: &AuthContext,
    status: StatusCode,
    mailing: Mailing,
    error: Option<String>,
) -> Result<Response, WebError> {
    let recipient_count = state.repos.mailings.recipients(mailing.id).await?.len();
    let view = MailingView::build(state, mailing).await?;

    page_with_status(
        state,
        status,
        "mailing_start.html",
        context! {
            user => auth.viewer(),
            mailing => view,
            recipient_count => recipient_count,
            error => error,
        },
    )
}

/// Confirmation page before a dispatch
pub async fn start_page_get(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
) -> Result<Response, WebError> {
    let mailing = load(&state, id).await?;
    require_owner(&auth, mailing.owner_id)?;

    start_page(&state, &auth, StatusCode::OK, mailing, None).await
}

/// Run the dispatch routine for a mailing
pub async fn start(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
) -> Result<Response, WebError> {
    let mailing = load(&state, id).await?;
    require_owner(&auth, mailing.owner_id)?;

    info!(mailing_id = %id, user_id = %auth.user_id(), "Mailing start requested");
    let refusal = match state.manager.dispatch(id).await? {
        DispatchOutcome::Sent(report) => {
            info!(
                mailing_id = %id,
                attempted = report.attempted,
                failed = report.failed,
                "Mailing started from the web UI"
            );
            return Ok(Redirect::to(&format!("/attempts?mailing={}", id)).into_response());
        }
        DispatchOutcome::Blocked => "This mailing is blocked and cannot be started.".to_string(),
        DispatchOutcome::AlreadyDispatched(status) => format!(
            "This mailing has already been started (status: {}).",
            status.label()
        ),
    };

    let mailing = load(&state, id).await?;
    start_page(&state, &auth, StatusCode::CONFLICT, mailing, Some(refusal)).await
}

/// Block form
pub async fn block_page(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
) -> Result<Response, WebError> {
    require_permission(&auth, Permission::BlockMailings)?;
    let mailing = load(&state, id).await?;
    let view = MailingView::build(&state, mailing).await?;

    page(
        &state,
        "mailing_block.html",
        context! { user => auth.viewer(), mailing => view },
    )
}

/// Set or clear the block flag
pub async fn block(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MailingId>,
    Form(form): Form<BlockForm>,
) -> Result<Response, WebError> {
    require_permission(&auth, Permission::BlockMailings)?;

    let mailing = if form.blocked() {
        state.manager.block(id).await?
    } else {
        state.manager.unblock(id).await?
    };

    info!(
        mailing_id = %id,
        blocked = mailing.is_blocked,
        user_id = %auth.user_id(),
        "Mailing block flag set from the web UI"
    );
    Ok(Redirect::to(&format!("/mailings/{}", id)).into_response())
}
