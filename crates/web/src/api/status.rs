//! Bridge status and health endpoints, plus the shared handler error type.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use linearsync_core::errors::{IdentityError, SyncError};

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: String,
}

/// Status response wrapping the core BridgeStatus.
#[derive(Serialize)]
struct StatusResponse {
    state: String,
    user_links: i64,
    mirrored_issues: i64,
    last_event_at: Option<String>,
    total_errors: i64,
    uptime_secs: u64,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/status/health", get(health_check))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.orchestrator.get_status()?;

    Ok(Json(StatusResponse {
        state: status.state.to_string(),
        user_links: status.user_links,
        mirrored_issues: status.mirrored_issues,
        last_event_at: status.last_event_at.map(|t| t.to_rfc3339()),
        total_errors: status.total_errors,
        uptime_secs: status.uptime_secs,
    }))
}

// ---------------------------------------------------------------------------
// Shared error type for API handlers
// ---------------------------------------------------------------------------

/// Handler-level error with an HTTP status for each failure class.
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    BadGateway(String),
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (axum::http::StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (axum::http::StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized(msg) => (axum::http::StatusCode::UNAUTHORIZED, msg),
            AppError::BadGateway(msg) => (axum::http::StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match &e {
            SyncError::NotLinked { .. } => AppError::BadRequest(e.to_string()),
            SyncError::Identity(IdentityError::InvalidPair(_)) => {
                AppError::BadRequest(e.to_string())
            }
            SyncError::GitHub(_)
            | SyncError::Linear(_)
            | SyncError::Identity(_)
            | SyncError::WebhookRegistration { .. } => AppError::BadGateway(e.to_string()),
            SyncError::Database(_) => AppError::Internal(e.to_string()),
        }
    }
}
