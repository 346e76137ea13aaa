//! LinearSync daemon entry point.
//!
//! Loads configuration, wires up the database, platform clients, and sync
//! orchestrator, then serves the web API until a shutdown signal arrives.
//! The daemon is webhook-driven: once both sides of the session are linked,
//! inbound deliveries do all the work.

mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use linearsync_core::config::AppConfig;
use linearsync_core::db::Database;
use linearsync_core::platform::{GitHubClient, LinearClient};
use linearsync_core::sync_engine::SyncOrchestrator;
use linearsync_web::WebServer;

/// LinearSync synchronization daemon.
#[derive(Parser, Debug)]
#[command(
    name = "linearsync-daemon",
    version,
    about = "Bidirectional Linear/GitHub issue synchronization daemon"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        AppConfig::load_from_file(&args.config).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables in config")?;
    config
        .validate()
        .context("configuration validation failed")?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    init_tracing(log_level);

    info!("========================================");
    info!("  LinearSync Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Linear API    : {}", config.linear.api_url);
    info!("GitHub API    : {}", config.github.api_url);
    info!("Web listen    : {}", config.web.listen);
    info!("Public URL    : {}", config.web.public_url.as_deref().unwrap_or("(not set)"));
    info!("Data dir      : {}", config.daemon.data_dir.display());
    info!("Log level     : {}", log_level);
    info!("========================================");

    if config.github.token.is_none() {
        warn!("GitHub token is not set; platform calls will be rejected");
    }
    if config.linear.api_key.is_none() {
        warn!("Linear API key is not set; platform calls will be rejected");
    }

    std::fs::create_dir_all(&config.daemon.data_dir).context("failed to create data directory")?;

    let db_path = config.daemon.data_dir.join("linearsync.db");
    let db = Database::new(&db_path).context("failed to open database")?;
    db.initialize()
        .context("failed to initialize database schema")?;
    info!("Database ready at {}", db_path.display());

    // Both clients share the configured request timeout.
    let timeout = Duration::from_secs(config.sync.http_timeout_secs);
    let github = GitHubClient::new(
        &config.github.api_url,
        config.github.token.clone().unwrap_or_default(),
        &config.github.user_agent,
        timeout,
    );
    let linear = LinearClient::new(
        &config.linear.api_url,
        config.linear.api_key.clone().unwrap_or_default(),
        timeout,
    );

    let orchestrator = Arc::new(SyncOrchestrator::new(
        config.clone(),
        Arc::new(db),
        github,
        linear,
    ));
    info!("Sync orchestrator ready");

    let listen_addr = config.web.listen.clone();
    let web_server = WebServer::new(config, orchestrator);
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start(&listen_addr).await {
            error!("web server error: {}", e);
        }
    });

    signals::wait_for_shutdown().await;
    info!("shutting down");
    web_handle.abort();

    info!("LinearSync daemon stopped.");
    Ok(())
}
