//! Audit log API.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::status::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
struct AuditEntryView {
    id: i64,
    created_at: String,
    action: String,
    platform: Option<String>,
    actor: Option<String>,
    details: Option<String>,
    success: bool,
}

#[derive(Serialize)]
struct AuditListResponse {
    entries: Vec<AuditEntryView>,
    total: usize,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/audit", get(list_audit))
}

/// Most recent audit entries, newest first. `limit` defaults to 50 and is
/// capped at 500.
async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditListResponse>, AppError> {
    let limit = query.limit.unwrap_or(50).min(500);

    let entries = state
        .orchestrator
        .db()
        .list_audit_entries(limit)
        .map_err(|e| AppError::Internal(format!("database error: {}", e)))?;

    let views: Vec<AuditEntryView> = entries
        .into_iter()
        .map(|e| AuditEntryView {
            id: e.id,
            created_at: e.created_at,
            action: e.action,
            platform: e.platform,
            actor: e.actor,
            details: e.details,
            success: e.success,
        })
        .collect();

    Ok(Json(AuditListResponse {
        total: views.len(),
        entries: views,
    }))
}
