//! Courier Web UI
//!
//! Server-rendered pages for managing recipients, messages and mailings,
//! starting and blocking mailings, and reviewing delivery attempts.

pub mod auth;
mod error;
mod forms;
mod handlers;
mod routes;
mod templates;

#[cfg(test)]
mod tests;

pub use error::WebError;
pub use templates::Templates;

use axum::Router;
use courier_common::Config;
use courier_core::{EntityCaches, MailTransport, MailingManager};
use courier_storage::Repositories;
use rust_embed::RustEmbed;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// How often expired sessions are purged
pub const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Static files for the web UI
#[derive(RustEmbed)]
#[folder = "static/"]
pub struct StaticAssets;

/// Application state for the web UI
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub manager: Arc<MailingManager>,
    pub transport: Arc<dyn MailTransport>,
    pub caches: Arc<EntityCaches>,
    pub templates: Arc<Templates>,
}

impl AppState {
    /// Create a new app state
    pub fn new(
        config: Config,
        repos: Repositories,
        transport: Arc<dyn MailTransport>,
    ) -> courier_common::Result<Self> {
        let caches = Arc::new(EntityCaches::from_config(&config.cache));
        let manager = Arc::new(MailingManager::new(
            repos.clone(),
            transport.clone(),
            config.smtp.from_address.clone(),
            caches.clone(),
        ));
        let templates = Templates::new()
            .map_err(|e| courier_common::Error::Internal(format!("Template error: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            repos,
            manager,
            transport,
            caches,
            templates: Arc::new(templates),
        })
    }
}

/// Create the web UI router
pub fn create_router(state: AppState) -> Router {
    routes::create_router(state)
}

/// Delete expired sessions every `period`, starting immediately
pub fn spawn_session_cleanup(repos: Repositories, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match repos.sessions.delete_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Expired sessions removed"),
                Err(e) => error!("Session cleanup failed: {}", e),
            }
        }
    })
}

/// Run the web UI server
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let bind = state.config.web.bind.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Web UI listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
