//! Web UI Routes
//!
//! Defines routes for the web UI.

use crate::error::ErrorPage;
use crate::handlers::{
    accounts, assets, attempts, home, mailings, messages, recipients, statistics,
};
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use minijinja::context;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::error;

/// Create the web UI router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Static assets
        .route("/static/*path", get(assets::static_file))
        // Health check
        .route("/health", get(assets::health))
        // Accounts
        .route("/", get(home::index))
        .route(
            "/register",
            get(accounts::register_page).post(accounts::register_submit),
        )
        .route("/login", get(accounts::login_page).post(accounts::login_submit))
        .route("/logout", get(accounts::logout).post(accounts::logout))
        // Recipients
        .route("/recipients", get(recipients::list))
        .route(
            "/recipients/new",
            get(recipients::new_page).post(recipients::create),
        )
        .route("/recipients/:id", get(recipients::detail))
        .route(
            "/recipients/:id/edit",
            get(recipients::edit_page).post(recipients::update),
        )
        .route(
            "/recipients/:id/delete",
            get(recipients::delete_page).post(recipients::delete),
        )
        // Messages
        .route("/messages", get(messages::list))
        .route("/messages/new", get(messages::new_page).post(messages::create))
        .route("/messages/:id", get(messages::detail))
        .route(
            "/messages/:id/edit",
            get(messages::edit_page).post(messages::update),
        )
        .route(
            "/messages/:id/delete",
            get(messages::delete_page).post(messages::delete),
        )
        // Mailings
        .route("/mailings", get(mailings::list))
        .route("/mailings/new", get(mailings::new_page).post(mailings::create))
        .route("/mailings/:id", get(mailings::detail))
        .route(
            "/mailings/:id/edit",
            get(mailings::edit_page).post(mailings::update),
        )
        .route(
            "/mailings/:id/delete",
            get(mailings::delete_page).post(mailings::delete),
        )
        .route(
            "/mailings/:id/start",
            get(mailings::start_page_get).post(mailings::start),
        )
        .route(
            "/mailings/:id/block",
            get(mailings::block_page).post(mailings::block),
        )
        // Attempts and statistics
        .route("/attempts", get(attempts::list))
        .route("/statistics", get(statistics::show))
        // Add middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            render_error_page,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Replace the plain-text body of an error response with the error page
async fn render_error_page(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(page) = response.extensions().get::<ErrorPage>().cloned() else {
        return response;
    };

    let status = response.status();
    let rendered = state.templates.render(
        "error.html",
        context! {
            status => status.as_u16(),
            reason => status.canonical_reason(),
            message => page.message,
        },
    );

    match rendered {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Template error: {}", e);
            response
        }
    }
}
