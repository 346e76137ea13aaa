//! Domain model types used throughout LinearSync.
//!
//! These types bridge the sync orchestrator, database layer, and web API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platforms
// ---------------------------------------------------------------------------

/// The two synchronized platforms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    GitHub,
    Linear,
}

impl Platform {
    /// The destination platform for content authored on `self`.
    pub fn opposite(self) -> Platform {
        match self {
            Self::GitHub => Self::Linear,
            Self::Linear => Self::GitHub,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitHub => write!(f, "github"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

// ---------------------------------------------------------------------------
// User links
// ---------------------------------------------------------------------------

/// One human across both platforms.
///
/// The `(github_user_id, linear_user_id)` pair is the natural key; the four
/// username/email fields are denormalized display identities refreshed on
/// every resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLink {
    pub id: i64,
    pub github_user_id: i64,
    pub linear_user_id: String,
    pub github_username: String,
    pub github_email: String,
    pub linear_username: String,
    pub linear_email: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A matched cross-platform username pair returned by the translator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsernamePair {
    pub github_username: String,
    pub linear_username: String,
}

impl UsernamePair {
    /// The username on the given platform.
    pub fn username_on(&self, platform: Platform) -> &str {
        match platform {
            Platform::GitHub => &self.github_username,
            Platform::Linear => &self.linear_username,
        }
    }
}

// ---------------------------------------------------------------------------
// Sync sessions
// ---------------------------------------------------------------------------

/// Link state of a sync session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Unlinked,
    PartiallyLinked,
    Linked,
}

impl LinkState {
    /// Parse a state string into a `LinkState`.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "linked" => Self::Linked,
            "partially_linked" => Self::PartiallyLinked,
            _ => Self::Unlinked,
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlinked => write!(f, "unlinked"),
            Self::PartiallyLinked => write!(f, "partially_linked"),
            Self::Linked => write!(f, "linked"),
        }
    }
}

/// One team/repository pairing, from unlinked through linked.
///
/// Either side may be chosen first; synchronization only runs once both are
/// present. Credentials are not stored here; they live in the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub id: String,
    pub linear_user_id: Option<String>,
    pub linear_team_id: Option<String>,
    pub linear_team_name: Option<String>,
    pub github_user_id: Option<i64>,
    pub github_repo_id: Option<i64>,
    pub github_repo_name: Option<String>,
    pub state: LinkState,
    pub github_webhook_id: Option<i64>,
    pub linear_webhook_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SyncSession {
    /// Whether the Linear side has been chosen.
    pub fn has_linear(&self) -> bool {
        self.linear_user_id.is_some() && self.linear_team_id.is_some()
    }

    /// Whether the GitHub side has been chosen.
    pub fn has_github(&self) -> bool {
        self.github_user_id.is_some() && self.github_repo_name.is_some()
    }

    /// The state implied by which sides are present.
    pub fn computed_state(&self) -> LinkState {
        match (self.has_linear(), self.has_github()) {
            (true, true) => LinkState::Linked,
            (false, false) => LinkState::Unlinked,
            _ => LinkState::PartiallyLinked,
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook events (narrowed at the web boundary)
// ---------------------------------------------------------------------------

/// A platform-tagged inbound event, already narrowed to the fields the core
/// needs. The core never sees platform-specific payload shapes.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    GitHub(GitHubEvent),
    Linear(LinearEvent),
}

#[derive(Debug, Clone)]
pub struct GitHubEvent {
    /// Numeric id of the user who triggered the event.
    pub actor_id: i64,
    pub actor_login: String,
    pub kind: GitHubEventKind,
}

#[derive(Debug, Clone)]
pub enum GitHubEventKind {
    IssueOpened {
        number: i64,
        title: String,
        body: Option<String>,
    },
    CommentCreated {
        issue_number: i64,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct LinearEvent {
    /// Opaque id of the user who triggered the event.
    pub actor_id: String,
    pub kind: LinearEventKind,
}

#[derive(Debug, Clone)]
pub enum LinearEventKind {
    IssueCreated {
        issue_id: String,
        title: String,
        description: Option<String>,
    },
    CommentCreated {
        issue_id: String,
        body: String,
    },
}

impl SyncEvent {
    /// The platform the event originated on.
    pub fn source(&self) -> Platform {
        match self {
            Self::GitHub(_) => Platform::GitHub,
            Self::Linear(_) => Platform::Linear,
        }
    }

    /// The event's free-text payload, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::GitHub(ev) => match &ev.kind {
                GitHubEventKind::IssueOpened { body, .. } => body.as_deref(),
                GitHubEventKind::CommentCreated { body, .. } => Some(body),
            },
            Self::Linear(ev) => match &ev.kind {
                LinearEventKind::IssueCreated { description, .. } => description.as_deref(),
                LinearEventKind::CommentCreated { body, .. } => Some(body),
            },
        }
    }

    /// Display identity of the actor, for audit records.
    pub fn actor(&self) -> String {
        match self {
            Self::GitHub(ev) => ev.actor_login.clone(),
            Self::Linear(ev) => ev.actor_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome of handling one event
// ---------------------------------------------------------------------------

/// What the orchestrator did with an inbound event.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SyncOutcome {
    /// A create call was issued on the destination platform.
    Mirrored {
        destination: Platform,
        reference: String,
    },
    /// The event's body carried the sync marker; it originated here.
    SkippedEcho,
    /// A comment event referenced an issue with no mirrored counterpart.
    SkippedUnmapped,
}

// ---------------------------------------------------------------------------
// Audit entries
// ---------------------------------------------------------------------------

/// One row for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub platform: Option<Platform>,
    pub actor: Option<String>,
    pub details: String,
    pub success: bool,
}

impl AuditEntry {
    /// Create a successful audit entry.
    pub fn success(action: &str, details: &str) -> Self {
        Self {
            action: action.to_string(),
            platform: None,
            actor: None,
            details: details.to_string(),
            success: true,
        }
    }

    /// Create a failed audit entry.
    pub fn failure(action: &str, details: &str) -> Self {
        Self {
            success: false,
            ..Self::success(action, details)
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Bridge status
// ---------------------------------------------------------------------------

/// High-level status summary for the web API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub state: LinkState,
    pub user_links: i64,
    pub mirrored_issues: i64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub total_errors: i64,
    pub uptime_secs: u64,
}
