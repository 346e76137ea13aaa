//! GitHub REST API client.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use crate::errors::GitHubError;

type HmacSha256 = Hmac<Sha256>;

/// The authenticated user returned by `GET /user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// An issue returned by the issues API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: i64,
    pub title: String,
    pub html_url: String,
    pub state: String,
}

/// A comment returned by the issue-comments API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubComment {
    pub id: i64,
    pub html_url: String,
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    /// Create a client for the given API base URL.
    ///
    /// Every request carries the configured User-Agent, per GitHub's API
    /// policy, and is bounded by `timeout`.
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent.into())
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        info!(api_url = %api_url, "created GitHubClient");
        Self {
            http,
            api_url,
            token: token.into(),
        }
    }

    /// Fetch the authenticated user ("who am I").
    #[instrument(skip(self))]
    pub async fn get_authenticated_user(&self) -> Result<GitHubUser, GitHubError> {
        let url = format!("{}/user", self.api_url);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        self.check_response(&resp)?;
        let user: GitHubUser = resp.json().await?;
        debug!(login = %user.login, "fetched authenticated user");
        Ok(user)
    }

    /// Create an issue in `repo` (`owner/repo` format).
    #[instrument(skip(self, body))]
    pub async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<GitHubIssue, GitHubError> {
        let url = format!("{}/repos/{}/issues", self.api_url, repo);
        let payload = serde_json::json!({ "title": title, "body": body });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        self.check_response(&resp)?;
        let issue: GitHubIssue = resp.json().await?;
        info!(number = issue.number, "created issue");
        Ok(issue)
    }

    /// Create a comment on an existing issue.
    #[instrument(skip(self, body))]
    pub async fn create_issue_comment(
        &self,
        repo: &str,
        issue_number: i64,
        body: &str,
    ) -> Result<GitHubComment, GitHubError> {
        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_url, repo, issue_number
        );
        let payload = serde_json::json!({ "body": body });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        self.check_response(&resp)?;
        let comment: GitHubComment = resp.json().await?;
        info!(issue_number, comment_id = comment.id, "created issue comment");
        Ok(comment)
    }

    /// Register a webhook on `repo` for issue and comment events.
    /// Returns the hook id.
    #[instrument(skip(self, secret))]
    pub async fn create_webhook(
        &self,
        repo: &str,
        callback_url: &str,
        secret: &str,
    ) -> Result<i64, GitHubError> {
        let url = format!("{}/repos/{}/hooks", self.api_url, repo);
        let body = serde_json::json!({
            "name": "web", "active": true, "events": ["issues", "issue_comment"],
            "config": { "url": callback_url, "content_type": "json", "secret": secret, "insecure_ssl": "0" }
        });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        self.check_response(&resp)?;
        let hook: serde_json::Value = resp.json().await?;
        let hook_id = hook["id"]
            .as_i64()
            .ok_or_else(|| GitHubError::ParseError("webhook response missing id".into()))?;
        info!(hook_id, "created webhook");
        Ok(hook_id)
    }

    /// Verify a GitHub webhook signature (`X-Hub-Signature-256`).
    pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
        let hex_sig = match signature.strip_prefix("sha256=") {
            Some(s) => s,
            None => {
                warn!("webhook signature missing sha256= prefix");
                return false;
            }
        };
        let expected_bytes = match hex::decode(hex_sig) {
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

    fn check_response(&self, resp: &reqwest::Response) -> Result<(), GitHubError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GitHubError::AuthenticationFailed(format!(
                "HTTP {}",
                status
            )));
        }
        if status.as_u16() == 429 {
            let reset = resp
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(GitHubError::RateLimited { reset_at: reset });
        }
        if status.is_server_error() {
            return Err(GitHubError::Unavailable {
                status: status.as_u16(),
            });
        }
        Err(GitHubError::ApiError {
            status: status.as_u16(),
            body: format!("HTTP {}", status),
        })
    }
}
