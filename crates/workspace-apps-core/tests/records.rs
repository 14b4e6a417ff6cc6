// crates/workspace-apps-core/tests/records.rs
// ============================================================================
// Module: Record Tests
// Description: Agent connection status and API key handling.
// Purpose: Keep status derivation and key secrets predictable.
// Dependencies: workspace-apps-core, time
// ============================================================================

//! Agent status and API key tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions use unwrap for clarity."
)]

mod common;

use time::Duration;
use workspace_apps_core::AgentStatus;
use workspace_apps_core::ApiKey;
use workspace_apps_core::ApiKeyScope;
use workspace_apps_core::ManualClock;
use workspace_apps_core::UserId;
use workspace_apps_core::interfaces::Clock;

use crate::common::NOW;
use crate::common::connected_agent;

const INACTIVE: Duration = Duration::minutes(1);

#[test]
fn recent_heartbeat_is_connected() {
    let agent = connected_agent("main");
    assert_eq!(agent.status(NOW, INACTIVE), AgentStatus::Connected);
    assert_eq!(agent.status(NOW + Duration::minutes(2), INACTIVE), AgentStatus::Disconnected);
}

#[test]
fn never_connected_agent_times_out() {
    let mut agent = connected_agent("main");
    agent.first_connected_at = None;
    agent.last_connected_at = None;
    agent.created_at = NOW - Duration::seconds(30);
    assert_eq!(agent.status(NOW, INACTIVE), AgentStatus::Connecting);
    assert_eq!(agent.status(NOW + Duration::minutes(5), INACTIVE), AgentStatus::Timeout);

    agent.connection_timeout_seconds = 0;
    assert_eq!(agent.status(NOW + Duration::hours(5), INACTIVE), AgentStatus::Connecting);
}

#[test]
fn disconnect_after_heartbeat_wins() {
    let mut agent = connected_agent("main");
    agent.disconnected_at = Some(NOW - Duration::seconds(1));
    assert_eq!(agent.status(NOW, INACTIVE), AgentStatus::Disconnected);
    assert_eq!(AgentStatus::Disconnected.to_string(), "disconnected");

    agent.disconnected_at = Some(NOW - Duration::minutes(10));
    assert_eq!(agent.status(NOW, INACTIVE), AgentStatus::Connected);
}

#[test]
fn generated_api_key_splits_and_matches() {
    let generated = ApiKey::generate(
        UserId::new_random(),
        NOW + Duration::hours(1),
        3600,
        ApiKeyScope::ApplicationConnect,
    );
    let (id, secret) = ApiKey::split_token(&generated.token).unwrap();
    assert_eq!(id, generated.key.id);
    assert_eq!(id.as_str().len(), 10);
    assert_eq!(secret.len(), 22);
    assert!(generated.key.secret_matches(secret));
    assert!(!generated.key.secret_matches("not-the-secret"));
    assert!(!generated.key.hashed_secret.is_empty());
}

#[test]
fn split_token_rejects_partial_tokens() {
    assert!(ApiKey::split_token("nodash").is_none());
    assert!(ApiKey::split_token("-secret").is_none());
    assert!(ApiKey::split_token("id-").is_none());
}

#[test]
fn api_key_expiry_is_inclusive() {
    let clock = ManualClock::new(NOW);
    let generated = ApiKey::generate(UserId::new_random(), NOW + Duration::seconds(10), 10, ApiKeyScope::All);
    assert!(!generated.key.is_expired(clock.now()));
    clock.advance(Duration::seconds(10));
    assert!(generated.key.is_expired(clock.now()));
}
