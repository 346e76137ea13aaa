//! LinearSync core library.
//!
//! This crate provides the foundational components for bidirectional
//! Linear/GitHub issue synchronization: configuration, database persistence,
//! identity resolution and username translation, mention rewriting, platform
//! API clients, and the sync orchestrator.

pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod mention;
pub mod models;
pub mod platform;
pub mod sync_engine;

pub use config::AppConfig;
pub use db::Database;
pub use identity::{IdentityResolver, UsernameTranslator};
pub use mention::MentionRewriter;
pub use sync_engine::SyncOrchestrator;
