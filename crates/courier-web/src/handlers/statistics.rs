//! Per-user delivery statistics page

use super::page;
use crate::auth::AuthContext;
use crate::error::WebError;
use crate::AppState;
use axum::extract::State;
use axum::response::Response;
use minijinja::context;

pub async fn show(State(state): State<AppState>, auth: AuthContext) -> Result<Response, WebError> {
    let stats = state.repos.statistics.get_or_create(auth.user_id()).await?;
    let success_rate = format!("{:.1}", stats.success_rate());

    page(
        &state,
        "statistics.html",
        context! {
            user => auth.viewer(),
            stats => stats,
            success_rate => success_rate,
        },
    )
}
