//! Batch username translation via the identity store.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::db::Database;
use crate::errors::DatabaseError;
use crate::models::{Platform, UsernamePair};

/// Read-only batch lookup of cross-platform username pairs.
pub struct UsernameTranslator {
    db: Arc<Database>,
}

impl UsernameTranslator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Translate usernames on `source` into their cross-platform pairs.
    ///
    /// One set-membership query serves the whole batch; usernames with no
    /// stored mapping are silently omitted from the result. An empty input
    /// returns an empty sequence without touching the store.
    pub fn map_usernames(
        &self,
        usernames: &BTreeSet<String>,
        source: Platform,
    ) -> Result<Vec<UsernamePair>, DatabaseError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let list: Vec<String> = usernames.iter().cloned().collect();
        let pairs = self.db.usernames_for(&list, source)?;
        debug!(
            platform = %source,
            requested = list.len(),
            matched = pairs.len(),
            "mapped usernames"
        );
        Ok(pairs)
    }
}
