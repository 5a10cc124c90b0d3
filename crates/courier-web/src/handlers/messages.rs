//! Message handlers

use super::{page, page_with_status};
use crate::auth::{require_owner, require_view, AuthContext};
use crate::error::WebError;
use crate::forms::{FormErrors, MessageForm};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use courier_common::types::{MessageId, Permission};
use courier_core::CacheScope;
use courier_storage::models::{CreateMessage, Message, UpdateMessage};
use minijinja::context;
use tracing::info;

async fn load(state: &AppState, id: MessageId) -> Result<Message, WebError> {
    state
        .repos
        .messages
        .get(id)
        .await?
        .ok_or_else(|| WebError::not_found(format!("message {}", id)))
}

fn form_page(
    state: &AppState,
    auth: &AuthContext,
    status: StatusCode,
    action: String,
    form: &MessageForm,
    errors: FormErrors,
) -> Result<Response, WebError> {
    page_with_status(
        state,
        status,
        "message_form.html",
        context! {
            user => auth.viewer(),
            action => action,
            form => form,
            errors => errors,
        },
    )
}

pub async fn list(State(state): State<AppState>, auth: AuthContext) -> Result<Response, WebError> {
    let scope = CacheScope::for_viewer(
        auth.user_id(),
        auth.has_permission(Permission::ViewAllMessages),
    );
    let repo = state.repos.messages.clone();
    let messages = state
        .caches
        .messages
        .get_or_load(scope, || async move { repo.list(scope.owner_filter()).await })
        .await?;

    page(
        &state,
        "message_list.html",
        context! { user => auth.viewer(), messages => messages },
    )
}

pub async fn new_page(State(state): State<AppState>, auth: AuthContext) -> Result<Response, WebError> {
    form_page(
        &state,
        &auth,
        StatusCode::OK,
        "/messages/new".to_string(),
        &MessageForm::default(),
        FormErrors::default(),
    )
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Form(form): Form<MessageForm>,
) -> Result<Response, WebError> {
    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return form_page(
                &state,
                &auth,
                StatusCode::UNPROCESSABLE_ENTITY,
                "/messages/new".to_string(),
                &form,
                errors,
            )
        }
    };

    let message = state
        .repos
        .messages
        .create(CreateMessage {
            title: valid.title,
            content: valid.content,
            owner_id: Some(auth.user_id()),
        })
        .await?;
    state.caches.messages.invalidate().await;

    info!(message_id = %message.id, user_id = %auth.user_id(), "Message created");
    Ok(Redirect::to(&format!("/messages/{}", message.id)).into_response())
}

pub async fn detail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MessageId>,
) -> Result<Response, WebError> {
    let message = load(&state, id).await?;
    require_view(&auth, message.owner_id, Permission::ViewAllMessages)?;
    let can_manage = auth.can_manage(message.owner_id);

    page(
        &state,
        "message_detail.html",
        context! {
            user => auth.viewer(),
            message => message,
            can_manage => can_manage,
        },
    )
}

pub async fn edit_page(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MessageId>,
) -> Result<Response, WebError> {
    let message = load(&state, id).await?;
    require_owner(&auth, message.owner_id)?;

    let form = MessageForm {
        title: message.title,
        content: message.content,
    };
    form_page(
        &state,
        &auth,
        StatusCode::OK,
        format!("/messages/{}/edit", id),
        &form,
        FormErrors::default(),
    )
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MessageId>,
    Form(form): Form<MessageForm>,
) -> Result<Response, WebError> {
    let message = load(&state, id).await?;
    require_owner(&auth, message.owner_id)?;

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return form_page(
                &state,
                &auth,
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("/messages/{}/edit", id),
                &form,
                errors,
            )
        }
    };

    state
        .repos
        .messages
        .update(
            id,
            UpdateMessage {
                title: valid.title,
                content: valid.content,
            },
        )
        .await?
        .ok_or_else(|| WebError::not_found(format!("message {}", id)))?;
    state.caches.messages.invalidate().await;

    info!(message_id = %id, "Message updated");
    Ok(Redirect::to(&format!("/messages/{}", id)).into_response())
}

pub async fn delete_page(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MessageId>,
) -> Result<Response, WebError> {
    let message = load(&state, id).await?;
    require_owner(&auth, message.owner_id)?;

    page(
        &state,
        "confirm_delete.html",
        context! {
            user => auth.viewer(),
            kind => "message",
            name => message.title,
            warning => "Mailings that send this message are deleted with it.",
            action => format!("/messages/{}/delete", id),
            cancel => format!("/messages/{}", id),
        },
    )
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<MessageId>,
) -> Result<Response, WebError> {
    let message = load(&state, id).await?;
    require_owner(&auth, message.owner_id)?;

    if !state.repos.messages.delete(id).await? {
        return Err(WebError::not_found(format!("message {}", id)));
    }
    state.caches.messages.invalidate().await;
    state.caches.mailings.invalidate().await;

    info!(message_id = %id, user_id = %auth.user_id(), "Message deleted with its mailings");
    Ok(Redirect::to("/messages").into_response())
}
