//! Idempotent resolution of cross-platform user identities.

use std::sync::Arc;

use tracing::{debug, info};

use crate::db::Database;
use crate::errors::IdentityError;
use crate::platform::{GitHubClient, LinearClient};

/// Resolves a `(github_user_id, linear_user_id)` pair into a stored
/// [`UserLink`](crate::models::UserLink), fetching the authenticated
/// viewer's profile from each platform.
///
/// The write is a single conflict-resolving upsert, so concurrent resolves
/// racing on the same pair converge on one row; see
/// [`Database::upsert_user_link`].
pub struct IdentityResolver {
    db: Arc<Database>,
}

impl IdentityResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Look up or create the identity record for the given pair.
    ///
    /// Both key components must be present: `github_user_id` non-zero and
    /// `linear_user_id` non-empty. The denormalized display identities are
    /// refreshed from the platform profile APIs on every call, so a stale
    /// username or email is corrected the next time the pair is observed.
    ///
    /// At most one store read, one profile fetch per platform, and one
    /// write. A rejected credential surfaces as an auth error; a network or
    /// 5xx failure surfaces as a transient one (see
    /// [`IdentityError::is_auth`] / [`IdentityError::is_transient`]).
    pub async fn resolve(
        &self,
        github: &GitHubClient,
        linear: &LinearClient,
        github_user_id: i64,
        linear_user_id: &str,
    ) -> Result<(), IdentityError> {
        if github_user_id == 0 {
            return Err(IdentityError::InvalidPair(
                "github_user_id must be non-zero".into(),
            ));
        }
        if linear_user_id.is_empty() {
            return Err(IdentityError::InvalidPair(
                "linear_user_id must be non-empty".into(),
            ));
        }

        match self.db.get_user_link(github_user_id, linear_user_id)? {
            Some(existing) => debug!(
                github_user_id,
                linear_user_id,
                github_username = %existing.github_username,
                "identity pair already mapped, refreshing display identities"
            ),
            None => info!(github_user_id, linear_user_id, "adding user to user_links"),
        }

        // One authenticated "who am I" call per platform.
        let github_user = github.get_authenticated_user().await?;
        let linear_user = linear.viewer().await?;

        self.db.upsert_user_link(
            github_user_id,
            linear_user_id,
            &github_user.login,
            github_user.email.as_deref().unwrap_or(""),
            &linear_user.display_name,
            linear_user.email.as_deref().unwrap_or(""),
        )?;

        debug!(github_user_id, linear_user_id, "identity pair upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn clients() -> (GitHubClient, LinearClient) {
        (
            GitHubClient::new(
                "https://api.invalid",
                "token",
                "linearsync-test/0.1",
                Duration::from_secs(1),
            ),
            LinearClient::new("https://api.invalid/graphql", "key", Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_rejects_zero_github_user_id() {
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();
        let resolver = IdentityResolver::new(db);
        let (github, linear) = clients();

        let result = resolver.resolve(&github, &linear, 0, "u_9").await;
        assert!(matches!(result, Err(IdentityError::InvalidPair(_))));
    }

    #[tokio::test]
    async fn test_rejects_empty_linear_user_id() {
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();
        let resolver = IdentityResolver::new(db);
        let (github, linear) = clients();

        let result = resolver.resolve(&github, &linear, 42, "").await;
        assert!(matches!(result, Err(IdentityError::InvalidPair(_))));
    }
}
