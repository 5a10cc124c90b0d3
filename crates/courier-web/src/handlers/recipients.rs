//! Recipient handlers

use super::{page, page_with_status};
use crate::auth::{require_owner, require_view, AuthContext};
use crate::error::WebError;
use crate::forms::{FormErrors, RecipientForm};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use courier_common::types::{Permission, RecipientId};
use courier_common::Error;
use courier_core::CacheScope;
use courier_storage::models::{CreateRecipient, Recipient, UpdateRecipient};
use minijinja::context;
use tracing::info;

const DUPLICATE_EMAIL: &str = "A recipient with this email already exists.";

async fn load(state: &AppState, id: RecipientId) -> Result<Recipient, WebError> {
    state
        .repos
        .recipients
        .get(id)
        .await?
        .ok_or_else(|| WebError::not_found(format!("recipient {}", id)))
}

fn form_page(
    state: &AppState,
    auth: &AuthContext,
    status: StatusCode,
    action: String,
    form: &RecipientForm,
    errors: FormErrors,
) -> Result<Response, WebError> {
    page_with_status(
        state,
        status,
        "recipient_form.html",
        context! {
            user => auth.viewer(),
            action => action,
            form => form,
            errors => errors,
        },
    )
}

/// Recipient list; own rows unless the viewer may see everyone's
pub async fn list(State(state): State<AppState>, auth: AuthContext) -> Result<Response, WebError> {
    let scope = CacheScope::for_viewer(
        auth.user_id(),
        auth.has_permission(Permission::ViewAllRecipients),
    );
    let repo = state.repos.recipients.clone();
    let recipients = state
        .caches
        .recipients
        .get_or_load(scope, || async move { repo.list(scope.owner_filter()).await })
        .await?;

    page(
        &state,
        "recipient_list.html",
        context! { user => auth.viewer(), recipients => recipients },
    )
}

pub async fn new_page(State(state): State<AppState>, auth: AuthContext) -> Result<Response, WebError> {
    form_page(
        &state,
        &auth,
        StatusCode::OK,
        "/recipients/new".to_string(),
        &RecipientForm::default(),
        FormErrors::default(),
    )
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Form(form): Form<RecipientForm>,
) -> Result<Response, WebError> {
    let action = "/recipients/new".to_string();
    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return form_page(&state, &auth, StatusCode::UNPROCESSABLE_ENTITY, action, &form, errors)
        }
    };

    let created = state
        .repos
        .recipients
        .create(CreateRecipient {
            email: valid.email.clone(),
            full_name: valid.full_name.clone(),
            note: valid.note.clone(),
            owner_id: Some(auth.user_id()),
        })
        .await;

    let recipient = match created {
        Ok(recipient) => recipient,
        Err(Error::Conflict(_)) => {
            let mut errors = FormErrors::default();
            errors.add(DUPLICATE_EMAIL);
            return form_page(&state, &auth, StatusCode::UNPROCESSABLE_ENTITY, action, &valid, errors);
        }
        Err(e) => return Err(e.into()),
    };
    state.caches.recipients.invalidate().await;

    info!(recipient_id = %recipient.id, user_id = %auth.user_id(), "Recipient created");
    Ok(Redirect::to(&format!("/recipients/{}", recipient.id)).into_response())
}

pub async fn detail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<RecipientId>,
) -> Result<Response, WebError> {
    let recipient = load(&state, id).await?;
    require_view(&auth, recipient.owner_id, Permission::ViewAllRecipients)?;
    let can_manage = auth.can_manage(recipient.owner_id);

    page(
        &state,
        "recipient_detail.html",
        context! {
            user => auth.viewer(),
            recipient => recipient,
            can_manage => can_manage,
        },
    )
}

pub async fn edit_page(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<RecipientId>,
) -> Result<Response, WebError> {
    let recipient = load(&state, id).await?;
    require_owner(&auth, recipient.owner_id)?;

    let form = RecipientForm {
        email: recipient.email,
        full_name: recipient.full_name,
        note: recipient.note,
    };
    form_page(
        &state,
        &auth,
        StatusCode::OK,
        format!("/recipients/{}/edit", id),
        &form,
        FormErrors::default(),
    )
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<RecipientId>,
    Form(form): Form<RecipientForm>,
) -> Result<Response, WebError> {
    let recipient = load(&state, id).await?;
    require_owner(&auth, recipient.owner_id)?;

    let action = format!("/recipients/{}/edit", id);
    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return form_page(&state, &auth, StatusCode::UNPROCESSABLE_ENTITY, action, &form, errors)
        }
    };

    let updated = state
        .repos
        .recipients
        .update(
            id,
            UpdateRecipient {
                email: valid.email.clone(),
                full_name: valid.full_name.clone(),
                note: valid.note.clone(),
            },
        )
        .await;

    match updated {
        Ok(Some(_)) => {}
        Ok(None) => return Err(WebError::not_found(format!("recipient {}", id))),
        Err(Error::Conflict(_)) => {
            let mut errors = FormErrors::default();
            errors.add(DUPLICATE_EMAIL);
            return form_page(&state, &auth, StatusCode::UNPROCESSABLE_ENTITY, action, &valid, errors);
        }
        Err(e) => return Err(e.into()),
    }
    state.caches.recipients.invalidate().await;

    info!(recipient_id = %id, "Recipient updated");
    Ok(Redirect::to(&format!("/recipients/{}", id)).into_response())
}

pub async fn delete_page(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<RecipientId>,
) -> Result<Response, WebError> {
    let recipient = load(&state, id).await?;
    require_owner(&auth, recipient.owner_id)?;

    page(
        &state,
        "confirm_delete.html",
        context! {
            user => auth.viewer(),
            kind => "recipient",
            name => format!("{} <{}>", recipient.full_name, recipient.email),
            action => format!("/recipients/{}/delete", id),
            cancel => format!("/recipients/{}", id),
        },
    )
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<RecipientId>,
) -> Result<Response, WebError> {
    let recipient = load(&state, id).await?;
    require_owner(&auth, recipient.owner_id)?;

    if !state.repos.recipients.delete(id).await? {
        return Err(WebError::not_found(format!("recipient {}", id)));
    }
    state.caches.recipients.invalidate().await;

    info!(recipient_id = %id, user_id = %auth.user_id(), "Recipient deleted");
    Ok(Redirect::to("/recipients").into_response())
}
