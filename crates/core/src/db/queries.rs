//! Typed query helpers for every table in the LinearSync database.

use chrono::Utc;
use rusqlite::params;
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::{AuditEntry, LinkState, Platform, SyncSession, UserLink, UsernamePair};

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub platform: Option<String>,
    pub actor: Option<String>,
    pub details: Option<String>,
    pub success: bool,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- user_links ---------------------------------------------------------

    /// Insert or update the identity record for one `(github_user_id,
    /// linear_user_id)` pair.
    ///
    /// This is a single conflict-resolving statement, so concurrent callers
    /// racing on the same pair converge on one row without a constraint
    /// error; the last write's display identities stick.
    pub fn upsert_user_link(
        &self,
        github_user_id: i64,
        linear_user_id: &str,
        github_username: &str,
        github_email: &str,
        linear_username: &str,
        linear_email: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO user_links
                 (github_user_id, linear_user_id, github_username, github_email,
                  linear_username, linear_email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(github_user_id, linear_user_id) DO UPDATE SET
                 github_username = excluded.github_username,
                 github_email    = excluded.github_email,
                 linear_username = excluded.linear_username,
                 linear_email    = excluded.linear_email,
                 updated_at      = excluded.updated_at",
            params![
                github_user_id,
                linear_user_id,
                github_username,
                github_email,
                linear_username,
                linear_email,
                now
            ],
        )?;
        debug!(github_user_id, linear_user_id, github_username, "upserted user link");
        Ok(())
    }

    /// Look up the identity record for an exact pair.
    pub fn get_user_link(
        &self,
        github_user_id: i64,
        linear_user_id: &str,
    ) -> Result<Option<UserLink>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, github_user_id, linear_user_id, github_username, github_email,
                    linear_username, linear_email, created_at, updated_at
             FROM user_links
             WHERE github_user_id = ?1 AND linear_user_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![github_user_id, linear_user_id], |row| {
            Ok(UserLink {
                id: row.get(0)?,
                github_user_id: row.get(1)?,
                linear_user_id: row.get(2)?,
                github_username: row.get(3)?,
                github_email: row.get(4)?,
                linear_username: row.get(5)?,
                linear_email: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?;
        match rows.next() {
            Some(Ok(link)) => Ok(Some(link)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Return the username pairs whose `platform`-side username is in
    /// `usernames`. One set-membership query serves the whole batch;
    /// usernames with no stored mapping are simply absent from the result.
    pub fn usernames_for(
        &self,
        usernames: &[String],
        platform: Platform,
    ) -> Result<Vec<UsernamePair>, DatabaseError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let column = match platform {
            Platform::GitHub => "github_username",
            Platform::Linear => "linear_username",
        };
        let placeholders = vec!["?"; usernames.len()].join(", ");
        let sql = format!(
            "SELECT github_username, linear_username FROM user_links
             WHERE {} IN ({}) ORDER BY id",
            column, placeholders
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let pairs = stmt
            .query_map(rusqlite::params_from_iter(usernames.iter()), |row| {
                Ok(UsernamePair {
                    github_username: row.get(0)?,
                    linear_username: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    /// Total number of identity records.
    pub fn count_user_links(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM user_links", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- sync_sessions ------------------------------------------------------

    /// Insert an empty (unlinked) session with the given id.
    pub fn insert_session(&self, id: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sync_sessions (id, state, created_at, updated_at)
             VALUES (?1, 'unlinked', ?2, ?2)
             ON CONFLICT(id) DO NOTHING",
            params![id, now],
        )?;
        debug!(id, "inserted sync session");
        Ok(())
    }

    /// The session this deployment manages (oldest row wins).
    pub fn current_session(&self) -> Result<Option<SyncSession>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY created_at LIMIT 1",
            SESSION_SELECT
        ))?;
        let mut rows = stmt.query_map([], map_session_row)?;
        match rows.next() {
            Some(Ok(session)) => Ok(Some(session)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Look up a session by id.
    pub fn get_session(&self, id: &str) -> Result<Option<SyncSession>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SESSION_SELECT))?;
        let mut rows = stmt.query_map(params![id], map_session_row)?;
        match rows.next() {
            Some(Ok(session)) => Ok(Some(session)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Record the chosen Linear side of a session.
    pub fn update_linear_side(
        &self,
        id: &str,
        user_id: &str,
        team_id: &str,
        team_name: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE sync_sessions
             SET linear_user_id = ?2, linear_team_id = ?3, linear_team_name = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, user_id, team_id, team_name, now],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "sync_session".into(),
                id: id.to_string(),
            });
        }
        debug!(id, team_id, "updated linear side of session");
        Ok(())
    }

    /// Record the chosen GitHub side of a session.
    pub fn update_github_side(
        &self,
        id: &str,
        user_id: i64,
        repo_id: i64,
        repo_name: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE sync_sessions
             SET github_user_id = ?2, github_repo_id = ?3, github_repo_name = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, user_id, repo_id, repo_name, now],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "sync_session".into(),
                id: id.to_string(),
            });
        }
        debug!(id, repo_name, "updated github side of session");
        Ok(())
    }

    /// Persist a session state transition.
    pub fn set_session_state(&self, id: &str, state: LinkState) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "UPDATE sync_sessions SET state = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, state.to_string(), now],
        )?;
        debug!(id, state = %state, "set session state");
        Ok(())
    }

    /// Record registered webhook ids on a session. `None` leaves the stored
    /// value untouched.
    pub fn set_session_webhooks(
        &self,
        id: &str,
        github_webhook_id: Option<i64>,
        linear_webhook_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "UPDATE sync_sessions
             SET github_webhook_id = COALESCE(?2, github_webhook_id),
                 linear_webhook_id = COALESCE(?3, linear_webhook_id),
                 updated_at = ?4
             WHERE id = ?1",
            params![id, github_webhook_id, linear_webhook_id, now],
        )?;
        debug!(id, "recorded session webhook ids");
        Ok(())
    }

    // -- issue_links --------------------------------------------------------

    /// Record a mirrored issue pair. Replaying the same pair is a no-op, so
    /// webhook redeliveries stay idempotent.
    pub fn insert_issue_link(
        &self,
        github_issue_number: i64,
        linear_issue_id: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO issue_links (github_issue_number, linear_issue_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![github_issue_number, linear_issue_id, now],
        )?;
        debug!(github_issue_number, linear_issue_id, "inserted issue link");
        Ok(())
    }

    /// Look up the mirrored Linear issue for a GitHub issue number.
    pub fn linear_issue_for(
        &self,
        github_issue_number: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT linear_issue_id FROM issue_links WHERE github_issue_number = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![github_issue_number], |row| row.get(0))?;
        match rows.next() {
            Some(Ok(id)) => Ok(Some(id)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Look up the mirrored GitHub issue for a Linear issue id.
    pub fn github_issue_for(&self, linear_issue_id: &str) -> Result<Option<i64>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT github_issue_number FROM issue_links WHERE linear_issue_id = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![linear_issue_id], |row| row.get(0))?;
        match rows.next() {
            Some(Ok(number)) => Ok(Some(number)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Total number of mirrored issue pairs.
    pub fn count_issue_links(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM issue_links", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- audit_log ----------------------------------------------------------

    /// Insert an audit-log entry.
    pub fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, platform, actor, details, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.action,
                entry.platform.map(|p| p.to_string()),
                entry.actor,
                entry.details,
                entry.success,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, action = %entry.action, success = entry.success, "inserted audit entry");
        Ok(id)
    }

    /// Return the most recent N audit entries, newest first.
    pub fn list_audit_entries(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, platform, actor, details, success, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    platform: row.get(2)?,
                    actor: row.get(3)?,
                    details: row.get(4)?,
                    success: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Number of failed audit entries.
    pub fn count_errors(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE success = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // -- kv_state -----------------------------------------------------------

    /// Read a state value by key.
    pub fn get_state(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM kv_state WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get(0))?;
        match rows.next() {
            Some(Ok(val)) => Ok(Some(val)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Upsert a state value.
    pub fn set_state(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        debug!(key, value, "set state");
        Ok(())
    }
}

const SESSION_SELECT: &str = "SELECT id, linear_user_id, linear_team_id, linear_team_name,
        github_user_id, github_repo_id, github_repo_name, state,
        github_webhook_id, linear_webhook_id, created_at, updated_at
 FROM sync_sessions";

fn map_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncSession> {
    let state: String = row.get(7)?;
    Ok(SyncSession {
        id: row.get(0)?,
        linear_user_id: row.get(1)?,
        linear_team_id: row.get(2)?,
        linear_team_name: row.get(3)?,
        github_user_id: row.get(4)?,
        github_repo_id: row.get(5)?,
        github_repo_name: row.get(6)?,
        state: LinkState::from_str_val(&state),
        github_webhook_id: row.get(8)?,
        linear_webhook_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn test_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_upsert_inserts_then_updates_in_place() {
        let db = test_db();
        db.upsert_user_link(42, "u_9", "bob", "b@x.com", "bob_l", "bl@x.com")
            .unwrap();

        let link = db.get_user_link(42, "u_9").unwrap().unwrap();
        assert_eq!(link.github_username, "bob");
        assert_eq!(link.github_email, "b@x.com");
        assert_eq!(link.linear_username, "bob_l");
        assert_eq!(link.linear_email, "bl@x.com");

        // Re-observing the same pair with different display identities must
        // update the row, not add a second one.
        db.upsert_user_link(42, "u_9", "bob", "bob@new.example", "bob_l", "bl@new.example")
            .unwrap();
        assert_eq!(db.count_user_links().unwrap(), 1);
        let link = db.get_user_link(42, "u_9").unwrap().unwrap();
        assert_eq!(link.github_email, "bob@new.example");
        assert_eq!(link.linear_email, "bl@new.example");
    }

    #[test]
    fn test_upsert_distinct_pairs_coexist() {
        let db = test_db();
        db.upsert_user_link(42, "u_9", "bob", "", "bob_l", "").unwrap();
        db.upsert_user_link(42, "u_10", "bob", "", "bob_alt", "").unwrap();
        db.upsert_user_link(43, "u_9", "carol", "", "bob_l", "").unwrap();
        assert_eq!(db.count_user_links().unwrap(), 3);
    }

    #[test]
    fn test_concurrent_upserts_converge_on_one_row() {
        let db = Arc::new(test_db());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    db.upsert_user_link(
                        42,
                        "u_9",
                        "bob",
                        &format!("bob{}@x.com", i),
                        "bob_l",
                        "bl@x.com",
                    )
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(db.count_user_links().unwrap(), 1);
        let link = db.get_user_link(42, "u_9").unwrap().unwrap();
        assert!(link.github_email.starts_with("bob"));
    }

    #[test]
    fn test_raw_constraint_violation_maps_to_conflict() {
        let db = test_db();
        let now = "2025-01-01T00:00:00Z";
        let insert = "INSERT INTO user_links
                 (github_user_id, linear_user_id, created_at, updated_at)
             VALUES (42, 'u_9', ?1, ?1)";
        db.conn().execute(insert, params![now]).unwrap();

        let err: DatabaseError = db
            .conn()
            .execute(insert, params![now])
            .unwrap_err()
            .into();
        assert!(matches!(err, DatabaseError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_usernames_for_empty_input() {
        let db = test_db();
        let pairs = db.usernames_for(&[], Platform::GitHub).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_usernames_for_set_membership() {
        let db = test_db();
        db.upsert_user_link(1, "u_1", "alice", "", "alice_l", "").unwrap();
        db.upsert_user_link(2, "u_2", "bob", "", "bob_l", "").unwrap();
        db.upsert_user_link(3, "u_3", "carol", "", "carol_l", "").unwrap();

        let names = vec!["alice".to_string(), "carol".to_string(), "ghost".to_string()];
        let pairs = db.usernames_for(&names, Platform::GitHub).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].github_username, "alice");
        assert_eq!(pairs[0].linear_username, "alice_l");
        assert_eq!(pairs[1].github_username, "carol");

        // Lookup by the Linear column finds the same people.
        let names = vec!["bob_l".to_string()];
        let pairs = db.usernames_for(&names, Platform::Linear).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].github_username, "bob");
    }

    #[test]
    fn test_session_lifecycle() {
        let db = test_db();
        assert!(db.current_session().unwrap().is_none());

        db.insert_session("s1").unwrap();
        let session = db.current_session().unwrap().unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.state, LinkState::Unlinked);

        db.update_linear_side("s1", "u_9", "team_1", Some("Platform")).unwrap();
        db.set_session_state("s1", LinkState::PartiallyLinked).unwrap();
        let session = db.get_session("s1").unwrap().unwrap();
        assert_eq!(session.linear_team_id.as_deref(), Some("team_1"));
        assert_eq!(session.state, LinkState::PartiallyLinked);
        assert!(session.has_linear());
        assert!(!session.has_github());

        db.update_github_side("s1", 42, 1001, "acme/widgets").unwrap();
        db.set_session_state("s1", LinkState::Linked).unwrap();
        let session = db.get_session("s1").unwrap().unwrap();
        assert_eq!(session.computed_state(), LinkState::Linked);

        db.set_session_webhooks("s1", Some(7), None).unwrap();
        db.set_session_webhooks("s1", None, Some("wh_1")).unwrap();
        let session = db.get_session("s1").unwrap().unwrap();
        assert_eq!(session.github_webhook_id, Some(7));
        assert_eq!(session.linear_webhook_id.as_deref(), Some("wh_1"));
    }

    #[test]
    fn test_update_missing_session_is_not_found() {
        let db = test_db();
        let result = db.update_linear_side("nope", "u", "t", None);
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn test_issue_links_round_trip() {
        let db = test_db();
        db.insert_issue_link(17, "iss_abc").unwrap();
        assert_eq!(db.linear_issue_for(17).unwrap().as_deref(), Some("iss_abc"));
        assert_eq!(db.github_issue_for("iss_abc").unwrap(), Some(17));
        assert_eq!(db.linear_issue_for(18).unwrap(), None);
        assert_eq!(db.github_issue_for("iss_missing").unwrap(), None);

        // Redelivery of the same pair is a no-op.
        db.insert_issue_link(17, "iss_abc").unwrap();
        assert_eq!(db.count_issue_links().unwrap(), 1);
    }

    #[test]
    fn test_audit_log() {
        let db = test_db();
        db.insert_audit_entry(
            &AuditEntry::success("webhook_event", "mirrored issue")
                .with_platform(Platform::GitHub)
                .with_actor("bob"),
        )
        .unwrap();
        db.insert_audit_entry(&AuditEntry::failure("webhook_event", "linear unavailable"))
            .unwrap();

        let entries = db.list_audit_entries(10).unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert!(!entries[0].success);
        assert!(entries[1].success);
        assert_eq!(entries[1].platform.as_deref(), Some("github"));
        assert_eq!(entries[1].actor.as_deref(), Some("bob"));
        assert_eq!(db.count_errors().unwrap(), 1);
    }

    #[test]
    fn test_kv_state() {
        let db = test_db();
        assert_eq!(db.get_state("last_event_at").unwrap(), None);
        db.set_state("last_event_at", "2025-01-01T00:00:00Z").unwrap();
        db.set_state("last_event_at", "2025-01-02T00:00:00Z").unwrap();
        assert_eq!(
            db.get_state("last_event_at").unwrap().as_deref(),
            Some("2025-01-02T00:00:00Z")
        );
    }
}
