//! LinearSync web server and REST API.
//!
//! Provides an Axum-based HTTP server with:
//! - Status and health endpoints
//! - The link API driving the sync session state machine
//! - The audit log API
//! - GitHub / Linear webhook receivers

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use linearsync_core::config::AppConfig;
use linearsync_core::sync_engine::SyncOrchestrator;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub config: AppConfig,
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server with the given dependencies.
    pub fn new(config: AppConfig, orchestrator: Arc<SyncOrchestrator>) -> Self {
        let state = Arc::new(AppState {
            orchestrator,
            config,
        });
        Self { state }
    }

    /// Bind `listen_addr` and serve requests until the task is aborted.
    pub async fn start(self, listen_addr: &str) -> anyhow::Result<()> {
        let addr: SocketAddr = listen_addr.parse()?;

        // Permissive CORS for a localhost link UI; webhook deliveries are
        // server-to-server and unaffected.
        let cors = CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

        let app = Router::new()
            .merge(api::status::routes())
            .merge(api::link::routes())
            .merge(api::audit::routes())
            .merge(api::webhooks::routes())
            .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state);

        info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
