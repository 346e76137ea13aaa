//! TOML configuration for LinearSync.
//!
//! Secrets (API keys, tokens, webhook signing secrets) never appear in the
//! config file itself; the file names environment variables via `*_env`
//! fields, and [`AppConfig::resolve_env_vars`] reads them at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Linear API settings.
    pub linear: LinearConfig,

    /// GitHub API settings.
    pub github: GitHubConfig,

    /// Web server settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for persistent data (the SQLite database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/linearsync")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Linear
// ---------------------------------------------------------------------------

/// Linear API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConfig {
    /// Linear GraphQL endpoint (default `https://api.linear.app/graphql`).
    #[serde(default = "default_linear_api_url")]
    pub api_url: String,

    /// Environment variable holding the Linear API key.
    pub api_key_env: String,

    /// Environment variable holding the webhook signing secret.
    #[serde(default)]
    pub webhook_secret_env: Option<String>,

    /// Resolved API key (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Resolved webhook secret.
    #[serde(skip)]
    pub webhook_secret: Option<String>,
}

fn default_linear_api_url() -> String {
    "https://api.linear.app/graphql".into()
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// GitHub API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Environment variable holding the GitHub access token.
    pub token_env: String,

    /// Environment variable holding the webhook secret.
    #[serde(default)]
    pub webhook_secret_env: Option<String>,

    /// User-Agent header sent with every API call, per GitHub's API policy.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,

    /// Resolved webhook secret.
    #[serde(skip)]
    pub webhook_secret: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_user_agent() -> String {
    "linearsync/0.1".into()
}

// ---------------------------------------------------------------------------
// Web server
// ---------------------------------------------------------------------------

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Listen address (default `127.0.0.1:3000`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Publicly reachable base URL that webhook deliveries are addressed to
    /// (e.g. `https://sync.example.com`). Required for webhook registration.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_listen() -> String {
    "127.0.0.1:3000".into()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_url: None,
        }
    }
}

impl WebConfig {
    /// Webhook callback URL for the given endpoint path.
    pub fn webhook_url(&self, path: &str) -> Option<String> {
        self.public_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')))
    }
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Sync behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Timeout for outbound platform API calls, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Extra characters (beyond word characters) allowed in GitHub mention
    /// tokens.
    #[serde(default)]
    pub github_mention_chars: String,

    /// Extra characters allowed in Linear mention tokens.
    #[serde(default)]
    pub linear_mention_chars: String,
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            github_mention_chars: String::new(),
            linear_mention_chars: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Parse an [`AppConfig`] from the TOML file at `path`.
    ///
    /// Secrets are not read here; call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        debug!(path = %path.display(), "reading configuration file");
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Read every `*_env` reference and fill in the corresponding resolved
    /// field.
    ///
    /// A missing variable logs a warning and leaves the field `None` instead
    /// of failing; what is actually required depends on the execution mode,
    /// so that decision is left to the caller.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.linear.api_key = secret_from_env("linear.api_key_env", &self.linear.api_key_env);
        self.github.token = secret_from_env("github.token_env", &self.github.token_env);

        self.linear.webhook_secret = self
            .linear
            .webhook_secret_env
            .as_deref()
            .and_then(|name| secret_from_env("linear.webhook_secret_env", name));
        self.github.webhook_secret = self
            .github
            .webhook_secret_env
            .as_deref()
            .and_then(|name| secret_from_env("github.webhook_secret_env", name));

        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.linear.api_key_env.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "linear.api_key_env".into(),
                detail: "Linear API key env var name must not be empty".into(),
            });
        }
        if self.github.token_env.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.token_env".into(),
                detail: "GitHub token env var name must not be empty".into(),
            });
        }
        if self.sync.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.http_timeout_secs".into(),
                detail: "HTTP timeout must be > 0".into(),
            });
        }
        if let Some(ref url) = self.web.public_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "web.public_url".into(),
                    detail: "public URL must start with http:// or https://".into(),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Read the secret named by `env_name` for the config field `field`.
/// Unset or empty variables warn and yield `None`.
fn secret_from_env(field: &str, env_name: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => {
            warn!(field, env_name, "secret env var is unset or empty");
            None
        }
    }
}
