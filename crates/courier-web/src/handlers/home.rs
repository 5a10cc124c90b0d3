//! Home page

use super::page;
use crate::auth::MaybeUser;
use crate::error::WebError;
use crate::AppState;
use axum::extract::State;
use axum::response::Response;
use minijinja::context;

/// Dashboard with mailing and recipient counters
pub async fn index(State(state): State<AppState>, user: MaybeUser) -> Result<Response, WebError> {
    let overview = state.repos.overview().await?;

    page(
        &state,
        "home.html",
        context! {
            user => user.viewer(),
            overview => overview,
        },
    )
}
