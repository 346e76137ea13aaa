//! Webhook receiver endpoints for GitHub and Linear event deliveries.
//!
//! Each handler verifies the delivery signature (when a secret is
//! configured), narrows the platform payload to the fields the core needs,
//! and dispatches the event to the orchestrator. The core never sees
//! platform-specific payload shapes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use linearsync_core::models::{
    GitHubEvent, GitHubEventKind, LinearEvent, LinearEventKind, SyncEvent, SyncOutcome,
};
use linearsync_core::platform::{GitHubClient, LinearClient};

use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// GitHub webhook types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GitHubIssuesPayload {
    action: String,
    issue: GitHubIssuePayload,
    sender: GitHubSenderPayload,
}

#[derive(Debug, Deserialize)]
struct GitHubIssueCommentPayload {
    action: String,
    issue: GitHubIssuePayload,
    comment: GitHubCommentPayload,
    sender: GitHubSenderPayload,
}

#[derive(Debug, Deserialize)]
struct GitHubIssuePayload {
    number: i64,
    title: String,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommentPayload {
    body: String,
}

#[derive(Debug, Deserialize)]
struct GitHubSenderPayload {
    id: i64,
    login: String,
}

// ---------------------------------------------------------------------------
// Linear webhook types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LinearWebhookPayload {
    action: String,
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinearIssueData {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    // Issue payloads carry the author as `creatorId`.
    #[serde(default, alias = "creatorId")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinearCommentData {
    body: String,
    issue_id: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct WebhookResponse {
    ok: bool,
    message: String,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook/github", post(github_webhook))
        .route("/webhook/linear", post(linear_webhook))
}

async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    // Signature verification runs only when a secret is configured.
    if let Some(ref secret) = state.config.github.webhook_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing X-Hub-Signature-256 header".into()))?;

        if !GitHubClient::verify_webhook_signature(&body, signature, secret) {
            return Err(AppError::Unauthorized(
                "webhook signature verification failed".into(),
            ));
        }
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let event = match event_type {
        "issues" => {
            let payload: GitHubIssuesPayload = serde_json::from_slice(&body)
                .map_err(|e| AppError::BadRequest(format!("invalid JSON payload: {}", e)))?;
            if payload.action != "opened" {
                return Ok(ignored(format!("issues action '{}'", payload.action)));
            }
            SyncEvent::GitHub(GitHubEvent {
                actor_id: payload.sender.id,
                actor_login: payload.sender.login,
                kind: GitHubEventKind::IssueOpened {
                    number: payload.issue.number,
                    title: payload.issue.title,
                    body: payload.issue.body,
                },
            })
        }
        "issue_comment" => {
            let payload: GitHubIssueCommentPayload = serde_json::from_slice(&body)
                .map_err(|e| AppError::BadRequest(format!("invalid JSON payload: {}", e)))?;
            if payload.action != "created" {
                return Ok(ignored(format!("issue_comment action '{}'", payload.action)));
            }
            SyncEvent::GitHub(GitHubEvent {
                actor_id: payload.sender.id,
                actor_login: payload.sender.login,
                kind: GitHubEventKind::CommentCreated {
                    issue_number: payload.issue.number,
                    body: payload.comment.body,
                },
            })
        }
        other => {
            debug!(event_type = other, "ignoring GitHub webhook event");
            return Ok(ignored(format!("event type '{}'", other)));
        }
    };

    info!(event_type, "received GitHub webhook");
    let outcome = state.orchestrator.handle_event(event).await?;
    Ok(outcome_response(outcome))
}

async fn linear_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    // Signature verification runs only when a secret is configured.
    if let Some(ref secret) = state.config.linear.webhook_secret {
        let signature = headers
            .get("linear-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing linear-signature header".into()))?;

        if !LinearClient::verify_webhook_signature(&body, signature, secret) {
            return Err(AppError::Unauthorized(
                "webhook signature verification failed".into(),
            ));
        }
    }

    let payload: LinearWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON payload: {}", e)))?;

    let event = match (payload.kind.as_str(), payload.action.as_str()) {
        ("Issue", "create") => {
            let data: LinearIssueData = serde_json::from_value(payload.data)
                .map_err(|e| AppError::BadRequest(format!("invalid issue data: {}", e)))?;
            SyncEvent::Linear(LinearEvent {
                actor_id: data.user_id.unwrap_or_default(),
                kind: LinearEventKind::IssueCreated {
                    issue_id: data.id,
                    title: data.title,
                    description: data.description,
                },
            })
        }
        ("Comment", "create") => {
            let data: LinearCommentData = serde_json::from_value(payload.data)
                .map_err(|e| AppError::BadRequest(format!("invalid comment data: {}", e)))?;
            SyncEvent::Linear(LinearEvent {
                actor_id: data.user_id.unwrap_or_default(),
                kind: LinearEventKind::CommentCreated {
                    issue_id: data.issue_id,
                    body: data.body,
                },
            })
        }
        (kind, action) => {
            debug!(kind, action, "ignoring Linear webhook event");
            return Ok(ignored(format!("{} {}", kind, action)));
        }
    };

    info!(kind = %payload.kind, action = %payload.action, "received Linear webhook");
    let outcome = state.orchestrator.handle_event(event).await?;
    Ok(outcome_response(outcome))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ignored(what: String) -> Json<WebhookResponse> {
    Json(WebhookResponse {
        ok: true,
        message: format!("{} ignored", what),
    })
}

fn outcome_response(outcome: SyncOutcome) -> Json<WebhookResponse> {
    let message = match outcome {
        SyncOutcome::Mirrored { destination, reference } => {
            format!("mirrored to {} as {}", destination, reference)
        }
        SyncOutcome::SkippedEcho => "echoed event skipped".to_string(),
        SyncOutcome::SkippedUnmapped => "no mirrored issue, skipped".to_string(),
    };
    Json(WebhookResponse { ok: true, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_issues_payload_narrows() {
        let raw = serde_json::json!({
            "action": "opened",
            "issue": { "number": 17, "title": "Login broken", "body": "hi @alice",
                       "html_url": "https://github.com/acme/widgets/issues/17" },
            "sender": { "id": 42, "login": "bob", "type": "User" },
            "repository": { "full_name": "acme/widgets" }
        });
        let payload: GitHubIssuesPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.action, "opened");
        assert_eq!(payload.issue.number, 17);
        assert_eq!(payload.issue.body.as_deref(), Some("hi @alice"));
        assert_eq!(payload.sender.id, 42);
        assert_eq!(payload.sender.login, "bob");
    }

    #[test]
    fn test_github_comment_payload_narrows() {
        let raw = serde_json::json!({
            "action": "created",
            "issue": { "number": 17, "title": "Login broken", "body": null },
            "comment": { "body": "ping @alice", "id": 555 },
            "sender": { "id": 42, "login": "bob" }
        });
        let payload: GitHubIssueCommentPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.comment.body, "ping @alice");
        assert_eq!(payload.issue.number, 17);
    }

    #[test]
    fn test_linear_issue_payload_narrows() {
        let raw = serde_json::json!({
            "action": "create",
            "type": "Issue",
            "createdAt": "2025-01-01T00:00:00.000Z",
            "data": {
                "id": "iss_1", "title": "A bug", "description": "details",
                "creatorId": "u_9", "teamId": "team_1"
            }
        });
        let payload: LinearWebhookPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.kind, "Issue");
        let data: LinearIssueData = serde_json::from_value(payload.data).unwrap();
        assert_eq!(data.id, "iss_1");
        assert_eq!(data.description.as_deref(), Some("details"));
        assert_eq!(data.user_id.as_deref(), Some("u_9"));
    }

    #[test]
    fn test_linear_comment_payload_narrows() {
        let raw = serde_json::json!({
            "action": "create",
            "type": "Comment",
            "data": { "id": "cm_1", "body": "ping @alice_l", "issueId": "iss_1", "userId": "u_9" }
        });
        let payload: LinearWebhookPayload = serde_json::from_value(raw).unwrap();
        let data: LinearCommentData = serde_json::from_value(payload.data).unwrap();
        assert_eq!(data.body, "ping @alice_l");
        assert_eq!(data.issue_id, "iss_1");
        assert_eq!(data.user_id.as_deref(), Some("u_9"));
    }
}
