//! Cross-platform sync orchestration.
//!
//! The [`SyncOrchestrator`] drives one sync session through its link state
//! machine and handles inbound webhook events once the session is linked:
//!
//! 1. Resolve the session's identity pair (idempotent upsert).
//! 2. Rewrite `@mentions` in the event's free text for the destination.
//! 3. Mirror the artifact with a create call on the destination platform.
//!
//! Bodies written by the bridge carry a marker footer; inbound events whose
//! body carries the marker are echoes of our own writes and are skipped.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::SyncError;
use crate::identity::{IdentityResolver, UsernameTranslator};
use crate::mention::{MentionRewriter, MentionScanner};
use crate::models::{
    AuditEntry, BridgeStatus, GitHubEventKind, LinearEventKind, LinkState, Platform, SyncEvent,
    SyncOutcome, SyncSession,
};
use crate::platform::{GitHubClient, LinearClient};

/// Marker string embedded in bridge-written bodies for echo detection.
const SYNC_MARKER: &str = "[linearsync]";

/// The sync orchestrator.
pub struct SyncOrchestrator {
    config: AppConfig,
    db: Arc<Database>,
    github: GitHubClient,
    linear: LinearClient,
    resolver: IdentityResolver,
    rewriter: MentionRewriter,
    started_at: chrono::DateTime<Utc>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator with all required dependencies.
    pub fn new(
        config: AppConfig,
        db: Arc<Database>,
        github: GitHubClient,
        linear: LinearClient,
    ) -> Self {
        info!("initializing sync orchestrator");
        let resolver = IdentityResolver::new(db.clone());
        let translator = UsernameTranslator::new(db.clone());
        let rewriter = MentionRewriter::with_scanners(
            translator,
            MentionScanner::with_extra_chars(&config.sync.github_mention_chars),
            MentionScanner::with_extra_chars(&config.sync.linear_mention_chars),
        );
        Self {
            config,
            db,
            github,
            linear,
            resolver,
            rewriter,
            started_at: Utc::now(),
        }
    }

    /// Return a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The session this deployment manages, created on first access.
    pub fn session(&self) -> Result<SyncSession, SyncError> {
        if let Some(session) = self.db.current_session()? {
            return Ok(session);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.db.insert_session(&id)?;
        info!(id = %id, "created sync session");
        self.db
            .get_session(&id)?
            .ok_or_else(|| {
                crate::errors::DatabaseError::NotFound {
                    entity: "sync_session".into(),
                    id,
                }
                .into()
            })
    }

    // -----------------------------------------------------------------------
    // Link state machine
    // -----------------------------------------------------------------------

    /// Record the chosen Linear side (user + team) of the session.
    pub async fn link_linear(
        &self,
        user_id: &str,
        team_id: &str,
        team_name: Option<&str>,
    ) -> Result<LinkState, SyncError> {
        let session = self.session()?;
        self.db
            .update_linear_side(&session.id, user_id, team_id, team_name)?;
        info!(team_id, "linked Linear side");
        self.finish_link(&session.id).await
    }

    /// Record the chosen GitHub side (user + repository) of the session.
    pub async fn link_github(
        &self,
        user_id: i64,
        repo_id: i64,
        repo_name: &str,
    ) -> Result<LinkState, SyncError> {
        let session = self.session()?;
        self.db
            .update_github_side(&session.id, user_id, repo_id, repo_name)?;
        info!(repo_name, "linked GitHub side");
        self.finish_link(&session.id).await
    }

    /// Persist the state implied by the stored sides and, on the transition
    /// into `Linked`, resolve the session's identity pair and register the
    /// webhooks.
    ///
    /// The linked state is persisted *before* webhook registration, so a
    /// registration failure is surfaced (as
    /// [`SyncError::WebhookRegistration`]) without un-linking the session;
    /// [`register_webhooks`](Self::register_webhooks) retries it on its own.
    async fn finish_link(&self, id: &str) -> Result<LinkState, SyncError> {
        let session = self.db.get_session(id)?.ok_or_else(|| {
            SyncError::from(crate::errors::DatabaseError::NotFound {
                entity: "sync_session".into(),
                id: id.to_string(),
            })
        })?;

        let state = session.computed_state();
        if state != session.state {
            info!(from = %session.state, to = %state, "sync session transition");
            self.db.set_session_state(id, state)?;
        }

        if state == LinkState::Linked && session.state != LinkState::Linked {
            if let (Some(github_user_id), Some(linear_user_id)) =
                (session.github_user_id, session.linear_user_id.as_deref())
            {
                self.resolver
                    .resolve(&self.github, &self.linear, github_user_id, linear_user_id)
                    .await?;
            }
            self.register_webhooks().await?;
        }

        Ok(state)
    }

    /// Register the inbound webhooks on both platforms, skipping any that
    /// are already recorded. Each successful registration is persisted
    /// immediately, so a retry only touches the missing side.
    pub async fn register_webhooks(&self) -> Result<(), SyncError> {
        let session = self.session()?;
        if session.computed_state() != LinkState::Linked {
            return Err(SyncError::NotLinked { id: session.id });
        }

        if session.github_webhook_id.is_none() {
            let callback = self.webhook_callback(Platform::GitHub)?;
            let repo = session.github_repo_name.as_deref().unwrap_or_default();
            let secret = self.config.github.webhook_secret.as_deref().unwrap_or("");
            let hook_id = self
                .github
                .create_webhook(repo, &callback, secret)
                .await
                .map_err(|e| SyncError::WebhookRegistration {
                    platform: Platform::GitHub,
                    detail: e.to_string(),
                })?;
            self.db
                .set_session_webhooks(&session.id, Some(hook_id), None)?;
            info!(hook_id, "registered GitHub webhook");
        }

        if session.linear_webhook_id.is_none() {
            let callback = self.webhook_callback(Platform::Linear)?;
            let team_id = session.linear_team_id.as_deref().unwrap_or_default();
            let secret = self.config.linear.webhook_secret.as_deref().unwrap_or("");
            let webhook_id = self
                .linear
                .create_webhook(team_id, &callback, secret)
                .await
                .map_err(|e| SyncError::WebhookRegistration {
                    platform: Platform::Linear,
                    detail: e.to_string(),
                })?;
            self.db
                .set_session_webhooks(&session.id, None, Some(&webhook_id))?;
            info!(webhook_id = %webhook_id, "registered Linear webhook");
        }

        Ok(())
    }

    fn webhook_callback(&self, platform: Platform) -> Result<String, SyncError> {
        let path = match platform {
            Platform::GitHub => "/webhook/github",
            Platform::Linear => "/webhook/linear",
        };
        self.config
            .web
            .webhook_url(path)
            .ok_or_else(|| SyncError::WebhookRegistration {
                platform,
                detail: "web.public_url is not configured".into(),
            })
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    /// Handle one inbound webhook event.
    ///
    /// The session must be linked. Echoes of our own writes are skipped
    /// before anything else runs. The outcome (and any failure) is recorded
    /// in the audit log; failures are returned, never swallowed.
    pub async fn handle_event(&self, event: SyncEvent) -> Result<SyncOutcome, SyncError> {
        let session = self.session()?;
        if session.computed_state() != LinkState::Linked {
            return Err(SyncError::NotLinked { id: session.id });
        }

        if event.body().is_some_and(|b| b.contains(SYNC_MARKER)) {
            debug!(source = %event.source(), "skipping echoed event");
            return Ok(SyncOutcome::SkippedEcho);
        }

        let source = event.source();
        let result = self.mirror_event(&session, &event).await;

        let entry = match &result {
            Ok(SyncOutcome::Mirrored { destination, reference }) => AuditEntry::success(
                "webhook_event",
                &format!("mirrored to {} as {}", destination, reference),
            ),
            Ok(outcome) => {
                AuditEntry::success("webhook_event", &format!("{:?}", outcome))
            }
            Err(e) => AuditEntry::failure("webhook_event", &e.to_string()),
        };
        let _ = self
            .db
            .insert_audit_entry(&entry.with_platform(source).with_actor(&event.actor()));
        let _ = self.db.set_state("last_event_at", &Utc::now().to_rfc3339());

        result
    }

    async fn mirror_event(
        &self,
        session: &SyncSession,
        event: &SyncEvent,
    ) -> Result<SyncOutcome, SyncError> {
        // Resolve the session's identity pair before any cross-platform
        // write, keeping the denormalized display names current.
        if let (Some(github_user_id), Some(linear_user_id)) =
            (session.github_user_id, session.linear_user_id.as_deref())
        {
            self.resolver
                .resolve(&self.github, &self.linear, github_user_id, linear_user_id)
                .await?;
        }

        match event {
            SyncEvent::GitHub(ev) => match &ev.kind {
                GitHubEventKind::IssueOpened { number, title, body } => {
                    let team_id = session
                        .linear_team_id
                        .as_deref()
                        .ok_or_else(|| SyncError::NotLinked { id: session.id.clone() })?;
                    let text =
                        self.rewrite_or_original(body.as_deref().unwrap_or(""), Platform::GitHub);
                    let description =
                        with_marker(&text, &format!("synced from GitHub issue #{}", number));
                    let issue = self.linear.create_issue(team_id, title, &description).await?;
                    self.db.insert_issue_link(*number, &issue.id)?;
                    info!(
                        github_issue = number,
                        linear_issue = %issue.identifier,
                        "mirrored GitHub issue to Linear"
                    );
                    Ok(SyncOutcome::Mirrored {
                        destination: Platform::Linear,
                        reference: issue.identifier,
                    })
                }
                GitHubEventKind::CommentCreated { issue_number, body } => {
                    let Some(linear_issue_id) = self.db.linear_issue_for(*issue_number)? else {
                        warn!(
                            github_issue = issue_number,
                            "comment on an issue with no mirrored counterpart, skipping"
                        );
                        return Ok(SyncOutcome::SkippedUnmapped);
                    };
                    let text = self.rewrite_or_original(body, Platform::GitHub);
                    let comment = with_marker(
                        &text,
                        &format!("synced from GitHub issue #{}", issue_number),
                    );
                    let comment_id = self.linear.create_comment(&linear_issue_id, &comment).await?;
                    Ok(SyncOutcome::Mirrored {
                        destination: Platform::Linear,
                        reference: comment_id,
                    })
                }
            },
            SyncEvent::Linear(ev) => match &ev.kind {
                LinearEventKind::IssueCreated { issue_id, title, description } => {
                    let repo = session
                        .github_repo_name
                        .as_deref()
                        .ok_or_else(|| SyncError::NotLinked { id: session.id.clone() })?;
                    let text = self.rewrite_or_original(
                        description.as_deref().unwrap_or(""),
                        Platform::Linear,
                    );
                    let body = with_marker(&text, "synced from Linear");
                    let issue = self.github.create_issue(repo, title, &body).await?;
                    self.db.insert_issue_link(issue.number, issue_id)?;
                    info!(
                        linear_issue = %issue_id,
                        github_issue = issue.number,
                        "mirrored Linear issue to GitHub"
                    );
                    Ok(SyncOutcome::Mirrored {
                        destination: Platform::GitHub,
                        reference: format!("#{}", issue.number),
                    })
                }
                LinearEventKind::CommentCreated { issue_id, body } => {
                    let Some(issue_number) = self.db.github_issue_for(issue_id)? else {
                        warn!(
                            linear_issue = %issue_id,
                            "comment on an issue with no mirrored counterpart, skipping"
                        );
                        return Ok(SyncOutcome::SkippedUnmapped);
                    };
                    let repo = session
                        .github_repo_name
                        .as_deref()
                        .ok_or_else(|| SyncError::NotLinked { id: session.id.clone() })?;
                    let text = self.rewrite_or_original(body, Platform::Linear);
                    let comment = with_marker(&text, "synced from Linear");
                    let created = self
                        .github
                        .create_issue_comment(repo, issue_number, &comment)
                        .await?;
                    Ok(SyncOutcome::Mirrored {
                        destination: Platform::GitHub,
                        reference: format!("#{} comment {}", issue_number, created.id),
                    })
                }
            },
        }
    }

    /// Mention rewriting must never abort the sync of the rest of the
    /// payload; on a store failure the text goes through as authored.
    fn rewrite_or_original(&self, text: &str, source: Platform) -> String {
        match self.rewriter.rewrite(text, source) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                warn!(error = %e, "mention rewrite failed, passing text through unchanged");
                text.to_string()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Get a status summary.
    pub fn get_status(&self) -> Result<BridgeStatus, SyncError> {
        let state = match self.db.current_session()? {
            Some(session) => session.computed_state(),
            None => LinkState::Unlinked,
        };

        let last_event_at = self.db.get_state("last_event_at")?.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });

        let uptime = (Utc::now() - self.started_at).num_seconds().max(0) as u64;

        Ok(BridgeStatus {
            state,
            user_links: self.db.count_user_links()?,
            mirrored_issues: self.db.count_issue_links()?,
            last_event_at,
            total_errors: self.db.count_errors()?,
            uptime_secs: uptime,
        })
    }
}

/// Append the echo-detection marker and provenance note to a body.
fn with_marker(text: &str, note: &str) -> String {
    format!("{}\n\n{} {}", text, SYNC_MARKER, note)
}

/// Whether a body was written by the bridge.
pub fn is_echo(body: &str) -> bool {
    body.contains(SYNC_MARKER)
}
