//! Schema definitions and the migration runner.
//!
//! Each migration is a plain SQL batch; the SQLite `user_version` pragma
//! records the highest version already applied, so startup only runs what
//! is missing.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// `(version, description, sql)` triples, ordered, starting at version 1.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial schema",
        r#"
        CREATE TABLE IF NOT EXISTS user_links (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            github_user_id   INTEGER NOT NULL CHECK (github_user_id <> 0),
            linear_user_id   TEXT    NOT NULL CHECK (linear_user_id <> ''),
            github_username  TEXT    NOT NULL DEFAULT '',
            github_email     TEXT    NOT NULL DEFAULT '',
            linear_username  TEXT    NOT NULL DEFAULT '',
            linear_email     TEXT    NOT NULL DEFAULT '',
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL,
            UNIQUE (github_user_id, linear_user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_user_links_github_username
            ON user_links (github_username);
        CREATE INDEX IF NOT EXISTS idx_user_links_linear_username
            ON user_links (linear_username);

        CREATE TABLE IF NOT EXISTS sync_sessions (
            id                TEXT PRIMARY KEY,
            linear_user_id    TEXT,
            linear_team_id    TEXT,
            linear_team_name  TEXT,
            github_user_id    INTEGER,
            github_repo_id    INTEGER,
            github_repo_name  TEXT,
            state             TEXT NOT NULL DEFAULT 'unlinked',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS issue_links (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            github_issue_number  INTEGER NOT NULL UNIQUE,
            linear_issue_id      TEXT    NOT NULL UNIQUE,
            created_at           TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            action      TEXT NOT NULL,
            platform    TEXT,
            actor       TEXT,
            details     TEXT,
            success     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log (action);

        CREATE TABLE IF NOT EXISTS kv_state (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        "#,
    ),
    (
        2,
        "record registered webhook ids on sync_sessions",
        r#"
        ALTER TABLE sync_sessions ADD COLUMN github_webhook_id INTEGER;
        ALTER TABLE sync_sessions ADD COLUMN linear_webhook_id TEXT;
        "#,
    ),
];

/// Bring `conn` up to the latest schema version.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn)?;
    let pending = MIGRATIONS.iter().filter(|m| m.0 > applied);

    for &(version, description, sql) in pending {
        info!(version, description, "applying schema migration");
        conn.execute_batch(sql)
            .map_err(|e| DatabaseError::MigrationFailed {
                version,
                detail: e.to_string(),
            })?;
        conn.pragma_update(None, "user_version", version)?;
    }

    debug!(version = schema_version(conn)?, "schema is current");
    Ok(())
}

/// The highest migration version already applied, from `user_version`.
fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}
