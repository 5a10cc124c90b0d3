//! Delivery attempt list

use super::page;
use crate::auth::AuthContext;
use crate::error::WebError;
use crate::forms::AttemptFilter;
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::Response;
use courier_common::types::Permission;
use courier_core::CacheScope;
use minijinja::context;

/// Attempts newest first, optionally narrowed to one mailing
pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(filter): Query<AttemptFilter>,
) -> Result<Response, WebError> {
    let sees_all = auth.has_permission(Permission::ViewAllAttempts);
    let scope = CacheScope::for_viewer(auth.user_id(), sees_all);
    let mailing_id = filter.mailing_id();

    let attempts = state
        .repos
        .attempts
        .list(scope.owner_filter(), mailing_id)
        .await?;

    let repo = state.repos.mailings.clone();
    let mailings = state
        .caches
        .mailings
        .get_or_load(scope, || async move { repo.list(scope.owner_filter()).await })
        .await?;

    page(
        &state,
        "attempt_list.html",
        context! {
            user => auth.viewer(),
            attempts => attempts,
            mailings => mailings,
            selected => mailing_id.map(|id| id.to_string()),
        },
    )
}
