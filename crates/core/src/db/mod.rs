//! SQLite persistence for the identity store and sync bookkeeping.
//!
//! [`Database`] wraps one connection behind a `Mutex`, which keeps the
//! handle `Send + Sync` for sharing via `Arc` across webhook tasks. The
//! upsert statements in [`queries`] are single conflict-resolving SQL
//! statements, so the store itself serializes racing writers.

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// Shared handle to the SQLite database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file at `path` and apply the standard
    /// pragmas: WAL journaling, foreign keys, and a busy timeout so writers
    /// queued behind the WAL lock wait instead of failing immediately.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        info!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply any pending schema migrations.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        schema::run_migrations(&self.conn())?;
        debug!("schema migrations complete");
        Ok(())
    }

    /// Lock the underlying connection.
    ///
    /// A poisoned mutex (a previous holder panicked mid-query) is recovered;
    /// SQLite's own journaling keeps the file consistent in that case.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering poisoned database lock");
            poisoned.into_inner()
        })
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let mut guard = self.conn();
        let tx = guard.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
