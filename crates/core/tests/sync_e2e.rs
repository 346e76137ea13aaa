//! End-to-end tests for the link flow and webhook-event mirroring.
//!
//! These tests exercise the real `SyncOrchestrator` with:
//! - Mock GitHub REST and Linear GraphQL servers via `wiremock`
//! - Real in-memory SQLite databases
//! - Real identity resolution and mention rewriting
//!
//! No external network I/O: every platform call lands on a local mock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use linearsync_core::config::{
    AppConfig, DaemonConfig, GitHubConfig, LinearConfig, SyncConfig, WebConfig,
};
use linearsync_core::db::Database;
use linearsync_core::errors::SyncError;
use linearsync_core::identity::IdentityResolver;
use linearsync_core::models::{
    GitHubEvent, GitHubEventKind, LinearEvent, LinearEventKind, LinkState, Platform, SyncEvent,
    SyncOutcome,
};
use linearsync_core::platform::{GitHubClient, LinearClient};
use linearsync_core::sync_engine::SyncOrchestrator;

// ===========================================================================
// Helpers
// ===========================================================================

const TIMEOUT: Duration = Duration::from_secs(5);

fn test_config(github_uri: &str, linear_uri: &str) -> AppConfig {
    AppConfig {
        daemon: DaemonConfig::default(),
        linear: LinearConfig {
            api_url: format!("{}/graphql", linear_uri),
            api_key_env: "LINEAR_API_KEY".into(),
            webhook_secret_env: None,
            api_key: Some("lin_api_test".into()),
            webhook_secret: None,
        },
        github: GitHubConfig {
            api_url: github_uri.to_string(),
            token_env: "GITHUB_TOKEN".into(),
            webhook_secret_env: None,
            user_agent: "linearsync-test/0.1".into(),
            token: Some("ghp_test".into()),
            webhook_secret: None,
        },
        web: WebConfig {
            listen: "127.0.0.1:0".into(),
            public_url: Some("https://sync.example.com".into()),
        },
        sync: SyncConfig::default(),
    }
}

fn clients(github_uri: &str, linear_uri: &str) -> (GitHubClient, LinearClient) {
    (
        GitHubClient::new(github_uri, "ghp_test", "linearsync-test/0.1", TIMEOUT),
        LinearClient::new(format!("{}/graphql", linear_uri), "lin_api_test", TIMEOUT),
    )
}

fn build_orchestrator(
    github_server: &MockServer,
    linear_server: &MockServer,
) -> (SyncOrchestrator, Arc<Database>) {
    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();
    let (github, linear) = clients(&github_server.uri(), &linear_server.uri());
    let config = test_config(&github_server.uri(), &linear_server.uri());
    (
        SyncOrchestrator::new(config, db.clone(), github, linear),
        db,
    )
}

async fn mount_profile_mocks(github_server: &MockServer, linear_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": "bob", "id": 42, "name": "Bob", "email": "b@x.com"
        })))
        .mount(github_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("viewer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "viewer": {
                "id": "u_9", "name": "Bob", "displayName": "bob_l", "email": "bl@x.com"
            }}
        })))
        .mount(linear_server)
        .await;
}

async fn mount_webhook_mocks(github_server: &MockServer, linear_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/hooks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 7 })))
        .mount(github_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("webhookCreate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "webhookCreate": {
                "success": true, "webhook": { "id": "wh_1", "enabled": true }
            }}
        })))
        .mount(linear_server)
        .await;
}

/// Link both sides of the session directly in the store, bypassing the
/// network-touching link flow, for tests that focus on event handling.
fn link_directly(db: &Database, orchestrator: &SyncOrchestrator) {
    let session = orchestrator.session().unwrap();
    db.update_linear_side(&session.id, "u_9", "team_1", Some("Platform"))
        .unwrap();
    db.update_github_side(&session.id, 42, 1001, "acme/widgets")
        .unwrap();
    db.set_session_state(&session.id, LinkState::Linked).unwrap();
}

// ===========================================================================
// Link flow
// ===========================================================================

#[tokio::test]
async fn test_link_flow_resolves_identity_and_registers_webhooks() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;
    mount_webhook_mocks(&github_server, &linear_server).await;

    let (orchestrator, db) = build_orchestrator(&github_server, &linear_server);

    let state = orchestrator
        .link_linear("u_9", "team_1", Some("Platform"))
        .await
        .unwrap();
    assert_eq!(state, LinkState::PartiallyLinked);

    let state = orchestrator
        .link_github(42, 1001, "acme/widgets")
        .await
        .unwrap();
    assert_eq!(state, LinkState::Linked);

    // Identity resolution populated all four denormalized fields.
    let link = db.get_user_link(42, "u_9").unwrap().unwrap();
    assert_eq!(link.github_username, "bob");
    assert_eq!(link.github_email, "b@x.com");
    assert_eq!(link.linear_username, "bob_l");
    assert_eq!(link.linear_email, "bl@x.com");

    // Both webhooks were registered and recorded.
    let session = orchestrator.session().unwrap();
    assert_eq!(session.github_webhook_id, Some(7));
    assert_eq!(session.linear_webhook_id.as_deref(), Some("wh_1"));
}

#[tokio::test]
async fn test_webhook_registration_failure_keeps_session_linked() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;

    // First registration attempt hits a 500; the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/hooks"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&github_server)
        .await;
    mount_webhook_mocks(&github_server, &linear_server).await;

    let (orchestrator, db) = build_orchestrator(&github_server, &linear_server);

    orchestrator
        .link_linear("u_9", "team_1", None)
        .await
        .unwrap();
    let result = orchestrator.link_github(42, 1001, "acme/widgets").await;
    assert!(matches!(
        result,
        Err(SyncError::WebhookRegistration { platform: Platform::GitHub, .. })
    ));

    // The failure did not roll back the transition: identifiers are
    // persisted and identity resolution already succeeded.
    let session = orchestrator.session().unwrap();
    assert_eq!(session.computed_state(), LinkState::Linked);
    assert!(db.get_user_link(42, "u_9").unwrap().is_some());
    assert!(session.github_webhook_id.is_none());

    // Retrying registration on its own completes the setup.
    orchestrator.register_webhooks().await.unwrap();
    let session = orchestrator.session().unwrap();
    assert_eq!(session.github_webhook_id, Some(7));
    assert_eq!(session.linear_webhook_id.as_deref(), Some("wh_1"));
}

// ===========================================================================
// Identity resolution
// ===========================================================================

#[tokio::test]
async fn test_concurrent_resolves_yield_exactly_one_row() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;

    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();
    let (github, linear) = clients(&github_server.uri(), &linear_server.uri());
    let resolver = IdentityResolver::new(db.clone());

    let (a, b) = tokio::join!(
        resolver.resolve(&github, &linear, 42, "u_9"),
        resolver.resolve(&github, &linear, 42, "u_9"),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(db.count_user_links().unwrap(), 1);
}

#[tokio::test]
async fn test_resolve_refreshes_display_identities_in_place() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;

    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();
    let (github, linear) = clients(&github_server.uri(), &linear_server.uri());
    let resolver = IdentityResolver::new(db.clone());

    resolver.resolve(&github, &linear, 42, "u_9").await.unwrap();
    let link = db.get_user_link(42, "u_9").unwrap().unwrap();
    assert_eq!(link.github_email, "b@x.com");

    // The platforms now report different emails; a re-resolve updates the
    // row in place instead of inserting a second one.
    github_server.reset().await;
    linear_server.reset().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": "bob", "id": 42, "name": "Bob", "email": "bob@new.example"
        })))
        .mount(&github_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "viewer": {
                "id": "u_9", "name": "Bob", "displayName": "bob_l", "email": "bl@new.example"
            }}
        })))
        .mount(&linear_server)
        .await;

    resolver.resolve(&github, &linear, 42, "u_9").await.unwrap();
    assert_eq!(db.count_user_links().unwrap(), 1);
    let link = db.get_user_link(42, "u_9").unwrap().unwrap();
    assert_eq!(link.github_email, "bob@new.example");
    assert_eq!(link.linear_email, "bl@new.example");
}

#[tokio::test]
async fn test_rejected_credential_is_an_auth_error() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&github_server)
        .await;

    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();
    let (github, linear) = clients(&github_server.uri(), &linear_server.uri());
    let resolver = IdentityResolver::new(db.clone());

    let err = resolver.resolve(&github, &linear, 42, "u_9").await.unwrap_err();
    assert!(err.is_auth());
    assert!(!err.is_transient());
    assert_eq!(db.count_user_links().unwrap(), 0);
}

#[tokio::test]
async fn test_upstream_5xx_is_a_transient_error() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&github_server)
        .await;

    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();
    let (github, linear) = clients(&github_server.uri(), &linear_server.uri());
    let resolver = IdentityResolver::new(db.clone());

    let err = resolver.resolve(&github, &linear, 42, "u_9").await.unwrap_err();
    assert!(err.is_transient());
    assert!(!err.is_auth());
}

// ===========================================================================
// Event mirroring
// ===========================================================================

#[tokio::test]
async fn test_github_issue_event_mirrors_to_linear_with_rewritten_mentions() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("issueCreate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "issueCreate": {
                "success": true,
                "issue": {
                    "id": "iss_1", "identifier": "ENG-1", "title": "Login broken",
                    "url": "https://linear.app/acme/issue/ENG-1"
                }
            }}
        })))
        .mount(&linear_server)
        .await;

    let (orchestrator, db) = build_orchestrator(&github_server, &linear_server);
    link_directly(&db, &orchestrator);
    db.upsert_user_link(1, "u_1", "alice", "", "alice_l", "").unwrap();

    let event = SyncEvent::GitHub(GitHubEvent {
        actor_id: 42,
        actor_login: "bob".into(),
        kind: GitHubEventKind::IssueOpened {
            number: 17,
            title: "Login broken".into(),
            body: Some("hi @alice please take a look".into()),
        },
    });
    let outcome = orchestrator.handle_event(event).await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Mirrored {
            destination: Platform::Linear,
            reference: "ENG-1".into(),
        }
    );

    // The issue pair was recorded for comment routing.
    assert_eq!(db.linear_issue_for(17).unwrap().as_deref(), Some("iss_1"));

    // The mirrored description carries the translated mention and the echo
    // marker.
    let requests = linear_server.received_requests().await.unwrap();
    let create_body = requests
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .find(|b| b.contains("issueCreate"))
        .expect("no issueCreate request");
    assert!(create_body.contains("@alice_l"));
    assert!(!create_body.contains("@alice "));
    assert!(create_body.contains("[linearsync]"));
}

#[tokio::test]
async fn test_linear_comment_event_routes_via_issue_link() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;

    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/issues/17/comments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 555, "html_url": "https://github.com/acme/widgets/issues/17#issuecomment-555"
        })))
        .mount(&github_server)
        .await;

    let (orchestrator, db) = build_orchestrator(&github_server, &linear_server);
    link_directly(&db, &orchestrator);
    db.upsert_user_link(1, "u_1", "alice", "", "alice_l", "").unwrap();
    db.insert_issue_link(17, "iss_1").unwrap();

    let event = SyncEvent::Linear(LinearEvent {
        actor_id: "u_9".into(),
        kind: LinearEventKind::CommentCreated {
            issue_id: "iss_1".into(),
            body: "ping @alice_l".into(),
        },
    });
    let outcome = orchestrator.handle_event(event).await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Mirrored {
            destination: Platform::GitHub,
            reference: "#17 comment 555".into(),
        }
    );

    // Mention translated into the GitHub username for the destination.
    let requests = github_server.received_requests().await.unwrap();
    let comment_body = requests
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .find(|b| b.contains("ping"))
        .expect("no comment request");
    assert!(comment_body.contains("@alice"));
    assert!(!comment_body.contains("@alice_l"));
}

#[tokio::test]
async fn test_comment_on_unmapped_issue_is_skipped() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;

    let (orchestrator, db) = build_orchestrator(&github_server, &linear_server);
    link_directly(&db, &orchestrator);

    let event = SyncEvent::GitHub(GitHubEvent {
        actor_id: 42,
        actor_login: "bob".into(),
        kind: GitHubEventKind::CommentCreated {
            issue_number: 99,
            body: "orphaned comment".into(),
        },
    });
    let outcome = orchestrator.handle_event(event).await.unwrap();
    assert_eq!(outcome, SyncOutcome::SkippedUnmapped);

    // Nothing was written to the destination platform.
    let requests = linear_server.received_requests().await.unwrap();
    assert!(!requests
        .iter()
        .any(|r| String::from_utf8_lossy(&r.body).contains("commentCreate")));
}

#[tokio::test]
async fn test_echoed_event_triggers_no_platform_calls() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;

    let (orchestrator, db) = build_orchestrator(&github_server, &linear_server);
    link_directly(&db, &orchestrator);

    let event = SyncEvent::GitHub(GitHubEvent {
        actor_id: 42,
        actor_login: "bob".into(),
        kind: GitHubEventKind::CommentCreated {
            issue_number: 17,
            body: "mirrored text\n\n[linearsync] synced from Linear".into(),
        },
    });
    let outcome = orchestrator.handle_event(event).await.unwrap();
    assert_eq!(outcome, SyncOutcome::SkippedEcho);

    assert!(github_server.received_requests().await.unwrap().is_empty());
    assert!(linear_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_destination_write_failure_is_reported() {
    let github_server = MockServer::start().await;
    let linear_server = MockServer::start().await;
    mount_profile_mocks(&github_server, &linear_server).await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("issueCreate"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&linear_server)
        .await;

    let (orchestrator, db) = build_orchestrator(&github_server, &linear_server);
    link_directly(&db, &orchestrator);

    let event = SyncEvent::GitHub(GitHubEvent {
        actor_id: 42,
        actor_login: "bob".into(),
        kind: GitHubEventKind::IssueOpened {
            number: 17,
            title: "Login broken".into(),
            body: None,
        },
    });
    let result = orchestrator.handle_event(event).await;
    assert!(matches!(result, Err(SyncError::Linear(_))));

    // The failure landed in the audit log.
    assert_eq!(db.count_errors().unwrap(), 1);
}
