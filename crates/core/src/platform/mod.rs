//! API clients for the two synchronized platforms.

pub mod github;
pub mod linear;

pub use github::GitHubClient;
pub use linear::LinearClient;
