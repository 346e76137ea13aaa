//! Linear GraphQL API client.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use crate::errors::LinearError;

type HmacSha256 = Hmac<Sha256>;

/// The authenticated user returned by the `viewer` query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearUser {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub email: Option<String>,
}

/// An issue returned by the `issueCreate` mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearIssue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub url: String,
}

/// Asynchronous Linear GraphQL API client.
#[derive(Clone)]
pub struct LinearClient {
    http: reqwest::Client,
    api_url: String,
}

impl LinearClient {
    /// Create a client for the given GraphQL endpoint.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let api_url = api_url.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let api_key = api_key.into();
        match HeaderValue::from_str(&api_key) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("Linear API key contains invalid header characters"),
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        info!(api_url = %api_url, "created LinearClient");
        Self { http, api_url }
    }

    /// Fetch the authenticated user ("who am I").
    #[instrument(skip(self))]
    pub async fn viewer(&self) -> Result<LinearUser, LinearError> {
        let query = "query { viewer { id name displayName email } }";
        let data = self.execute(query, serde_json::json!({})).await?;
        let user: LinearUser = serde_json::from_value(data["viewer"].clone())
            .map_err(|e| LinearError::ParseError(e.to_string()))?;
        debug!(display_name = %user.display_name, "fetched viewer");
        Ok(user)
    }

    /// Create an issue on the given team.
    #[instrument(skip(self, description))]
    pub async fn create_issue(
        &self,
        team_id: &str,
        title: &str,
        description: &str,
    ) -> Result<LinearIssue, LinearError> {
        let query = "mutation($teamId: String!, $title: String!, $description: String) {
            issueCreate(input: { teamId: $teamId, title: $title, description: $description }) {
                success
                issue { id identifier title url }
            }
        }";
        let variables = serde_json::json!({
            "teamId": team_id,
            "title": title,
            "description": description,
        });
        let data = self.execute(query, variables).await?;
        let issue: LinearIssue = serde_json::from_value(data["issueCreate"]["issue"].clone())
            .map_err(|e| LinearError::ParseError(e.to_string()))?;
        info!(identifier = %issue.identifier, "created issue");
        Ok(issue)
    }

    /// Create a comment on an existing issue. Returns the comment id.
    #[instrument(skip(self, body))]
    pub async fn create_comment(
        &self,
        issue_id: &str,
        body: &str,
    ) -> Result<String, LinearError> {
        let query = "mutation($issueId: String!, $body: String!) {
            commentCreate(input: { issueId: $issueId, body: $body }) {
                success
                comment { id }
            }
        }";
        let variables = serde_json::json!({ "issueId": issue_id, "body": body });
        let data = self.execute(query, variables).await?;
        let comment_id = data["commentCreate"]["comment"]["id"]
            .as_str()
            .ok_or_else(|| LinearError::ParseError("commentCreate response missing id".into()))?
            .to_string();
        info!(issue_id, comment_id = %comment_id, "created comment");
        Ok(comment_id)
    }

    /// Register a webhook for issue and comment events on the given team.
    /// Returns the webhook id.
    #[instrument(skip(self, secret))]
    pub async fn create_webhook(
        &self,
        team_id: &str,
        callback_url: &str,
        secret: &str,
    ) -> Result<String, LinearError> {
        let query = "mutation($teamId: String!, $url: String!, $secret: String!) {
            webhookCreate(input: { teamId: $teamId, url: $url, secret: $secret, resourceTypes: [\"Issue\", \"Comment\"] }) {
                success
                webhook { id enabled }
            }
        }";
        let variables = serde_json::json!({
            "teamId": team_id,
            "url": callback_url,
            "secret": secret,
        });
        let data = self.execute(query, variables).await?;
        let webhook_id = data["webhookCreate"]["webhook"]["id"]
            .as_str()
            .ok_or_else(|| LinearError::ParseError("webhookCreate response missing id".into()))?
            .to_string();
        info!(webhook_id = %webhook_id, "created webhook");
        Ok(webhook_id)
    }

    /// Verify a Linear webhook signature (`linear-signature` header, hex
    /// HMAC-SHA256 of the raw body).
    pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
        let expected_bytes = match hex::decode(signature) {
            Ok(b) => b,
            Err(_) => {
                warn!("webhook signature is not valid hex");
                return false;
            }
        };
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                warn!("failed to create HMAC");
                return false;
            }
        };
        mac.update(payload);
        mac.verify_slice(&expected_bytes).is_ok()
    }

    /// POST one GraphQL document and return its `data` value.
    async fn execute(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, LinearError> {
        let resp = self
            .http
            .post(&self.api_url)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        self.check_response(&resp)?;

        let body: serde_json::Value = resp.json().await?;
        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let detail = errors
                    .iter()
                    .filter_map(|e| e["message"].as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                let auth_rejected = errors.iter().any(|e| {
                    e["extensions"]["code"].as_str() == Some("AUTHENTICATION_ERROR")
                });
                return Err(if auth_rejected {
                    LinearError::AuthenticationFailed(detail)
                } else {
                    LinearError::GraphQl(detail)
                });
            }
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| LinearError::ParseError("response missing data".into()))
    }

    fn check_response(&self, resp: &reqwest::Response) -> Result<(), LinearError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LinearError::AuthenticationFailed(format!(
                "HTTP {}",
                status
            )));
        }
        if status.is_server_error() {
            return Err(LinearError::Unavailable {
                status: status.as_u16(),
            });
        }
        Err(LinearError::ApiError {
            status: status.as_u16(),
            body: format!("HTTP {}", status),
        })
    }
}
