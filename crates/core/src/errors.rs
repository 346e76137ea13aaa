//! Error types for the LinearSync core library.
//!
//! One `thiserror` enum per subsystem, unified under [`CoreError`] for
//! callers that want a single type. The platform enums carry classification
//! helpers ([`GitHubError::is_auth`], [`GitHubError::is_transient`] and the
//! Linear equivalents): a rejected credential is permanent until the user
//! re-authenticates, while a network or 5xx failure is worth retrying, and
//! callers need to tell them apart without matching every variant.

use thiserror::Error;

use crate::models::Platform;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Linear(#[from] LinearError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited {
        reset_at: String,
    },

    /// The API answered with a server-side failure.
    #[error("GitHub unavailable (HTTP {status})")]
    Unavailable {
        status: u16,
    },

    /// Webhook signature verification failed.
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    /// JSON deserialization failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

impl GitHubError {
    /// The credential was rejected; retrying without re-authentication
    /// cannot succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// Transient transport or server-side failure worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Unavailable { .. } | Self::RateLimited { .. } => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Linear API errors
// ---------------------------------------------------------------------------

/// Errors from Linear GraphQL API interactions.
#[derive(Debug, Error)]
pub enum LinearError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("Linear HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("Linear API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// API key is missing or invalid.
    #[error("Linear authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API answered with a server-side failure.
    #[error("Linear unavailable (HTTP {status})")]
    Unavailable {
        status: u16,
    },

    /// The response carried a GraphQL-level error.
    #[error("Linear GraphQL error: {0}")]
    GraphQl(String),

    /// Webhook signature verification failed.
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    /// JSON deserialization failure.
    #[error("Linear response parse error: {0}")]
    ParseError(String),
}

impl LinearError {
    /// The credential was rejected; retrying without re-authentication
    /// cannot succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// Transient transport or server-side failure worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Unavailable { .. } => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(rusqlite::Error),

    /// A constraint race surfaced to the caller. Retryable; the conflicting
    /// write has already been serialized by the store.
    #[error("database conflict: {0}")]
    Conflict(String),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DatabaseError::Conflict(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => DatabaseError::SqliteError(e),
        }
    }
}

impl DatabaseError {
    /// Conflicts are safe to retry; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

/// Errors from the identity resolution subsystem.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// One of the key components is missing or zero.
    #[error("invalid identity pair: {0}")]
    InvalidPair(String),

    /// GitHub profile fetch failed.
    #[error("identity GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    /// Linear profile fetch failed.
    #[error("identity Linear error: {0}")]
    Linear(#[from] LinearError),

    /// Identity store failure.
    #[error("identity store error: {0}")]
    Database(#[from] DatabaseError),
}

impl IdentityError {
    /// A platform rejected the credential.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::GitHub(e) => e.is_auth(),
            Self::Linear(e) => e.is_auth(),
            _ => false,
        }
    }

    /// Transient upstream or store failure worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::GitHub(e) => e.is_transient(),
            Self::Linear(e) => e.is_transient(),
            Self::Database(e) => e.is_retryable(),
            Self::InvalidPair(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Sync orchestrator errors
// ---------------------------------------------------------------------------

/// Errors from the sync orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An event arrived before both sides of the session were linked.
    #[error("sync session {id} is not linked")]
    NotLinked {
        id: String,
    },

    /// Webhook registration failed after the linked state was persisted.
    /// The session stays linked; registration can be retried on its own.
    #[error("webhook registration failed on {platform}: {detail}")]
    WebhookRegistration {
        platform: Platform,
        detail: String,
    },

    /// Underlying GitHub error during sync.
    #[error("sync GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    /// Underlying Linear error during sync.
    #[error("sync Linear error: {0}")]
    Linear(#[from] LinearError),

    /// Database error during sync.
    #[error("sync database error: {0}")]
    Database(#[from] DatabaseError),

    /// Identity resolution error during sync.
    #[error("sync identity error: {0}")]
    Identity(#[from] IdentityError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
