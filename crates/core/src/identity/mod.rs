//! Identity resolution and username translation between the two platforms.
//!
//! The persistent mapping lives in the `user_links` table: one row per
//! human, keyed uniquely on the `(github_user_id, linear_user_id)` pair.
//! The resolver writes rows; the translator reads them in batches.

pub mod resolver;
pub mod translator;

pub use resolver::IdentityResolver;
pub use translator::UsernameTranslator;
