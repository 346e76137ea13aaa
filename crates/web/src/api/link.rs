//! Link API: drives the sync session through its state machine.
//!
//! Either side may be submitted on its own; synchronization starts once
//! both are present. The session context is explicit -- there is no
//! process-wide mutable state behind these handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use linearsync_core::errors::SyncError;

use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LinkRequest {
    #[serde(default)]
    pub linear: Option<LinearSide>,
    #[serde(default)]
    pub github: Option<GitHubSide>,
}

#[derive(Deserialize)]
pub struct LinearSide {
    pub user_id: String,
    pub team_id: String,
    #[serde(default)]
    pub team_name: Option<String>,
}

#[derive(Deserialize)]
pub struct GitHubSide {
    pub user_id: i64,
    pub repo_id: i64,
    pub repo_name: String,
}

#[derive(Serialize)]
struct LinkResponse {
    state: String,
    webhooks_registered: bool,
    /// Set when the session linked but webhook registration failed; the
    /// caller can retry via `POST /api/link/webhooks`.
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/link", post(save_link).get(get_link))
        .route("/api/link/webhooks", post(retry_webhooks))
}

async fn save_link(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LinkRequest>,
) -> Result<Json<LinkResponse>, AppError> {
    if body.linear.is_none() && body.github.is_none() {
        return Err(AppError::BadRequest(
            "at least one of 'linear' or 'github' must be provided".into(),
        ));
    }

    let orchestrator = &state.orchestrator;
    let mut webhook_error = None;

    if let Some(linear) = &body.linear {
        if linear.user_id.is_empty() || linear.team_id.is_empty() {
            return Err(AppError::BadRequest(
                "linear.user_id and linear.team_id must be non-empty".into(),
            ));
        }
        if let Err(e) = orchestrator
            .link_linear(&linear.user_id, &linear.team_id, linear.team_name.as_deref())
            .await
        {
            collect_webhook_failure(e, &mut webhook_error)?;
        }
    }

    if let Some(github) = &body.github {
        if github.user_id == 0 || github.repo_name.is_empty() {
            return Err(AppError::BadRequest(
                "github.user_id and github.repo_name must be non-empty".into(),
            ));
        }
        if let Err(e) = orchestrator
            .link_github(github.user_id, github.repo_id, &github.repo_name)
            .await
        {
            collect_webhook_failure(e, &mut webhook_error)?;
        }
    }

    link_response(&state, webhook_error)
}

async fn get_link(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LinkResponse>, AppError> {
    link_response(&state, None)
}

async fn retry_webhooks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LinkResponse>, AppError> {
    let mut webhook_error = None;
    if let Err(e) = state.orchestrator.register_webhooks().await {
        collect_webhook_failure(e, &mut webhook_error)?;
    }
    link_response(&state, webhook_error)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A webhook-registration failure leaves the session linked, so it is
/// reported in the response body instead of failing the request; anything
/// else propagates.
fn collect_webhook_failure(
    e: SyncError,
    webhook_error: &mut Option<String>,
) -> Result<(), AppError> {
    match e {
        SyncError::WebhookRegistration { platform, detail } => {
            warn!(%platform, detail, "webhook registration failed");
            *webhook_error = Some(format!("{}: {}", platform, detail));
            Ok(())
        }
        other => Err(other.into()),
    }
}

fn link_response(
    state: &Arc<AppState>,
    webhook_error: Option<String>,
) -> Result<Json<LinkResponse>, AppError> {
    let session = state.orchestrator.session()?;
    let webhooks_registered =
        session.github_webhook_id.is_some() && session.linear_webhook_id.is_some();
    Ok(Json(LinkResponse {
        state: session.computed_state().to_string(),
        webhooks_registered,
        error: webhook_error,
    }))
}
