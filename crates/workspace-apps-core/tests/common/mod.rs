// crates/workspace-apps-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Fixtures
// Description: Shared in-memory world for resolution and authorization tests.
// Purpose: Keep record setup out of individual test files.
// Dependencies: workspace-apps-core, time
// ============================================================================

//! Shared fixtures for workspace-apps-core integration tests.

#![allow(dead_code, reason = "Each test binary uses a different fixture subset.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Fixture setup failures should abort the test."
)]

use std::sync::Arc;

use time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;
use workspace_apps_core::AgentId;
use workspace_apps_core::AppId;
use workspace_apps_core::InMemoryAppStore;
use workspace_apps_core::SharingLevel;
use workspace_apps_core::User;
use workspace_apps_core::UserId;
use workspace_apps_core::Workspace;
use workspace_apps_core::WorkspaceAgent;
use workspace_apps_core::WorkspaceApp;
use workspace_apps_core::WorkspaceBuild;
use workspace_apps_core::WorkspaceId;
use workspace_apps_core::WorkspaceTransition;

/// Fixed evaluation time for fixtures.
pub const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

/// Populated store plus handles to the records in it.
pub struct World {
    pub store: InMemoryAppStore,
    pub owner: User,
    pub other: User,
    pub site_admin: User,
    pub workspace: Workspace,
    pub agent: WorkspaceAgent,
}

impl World {
    pub fn store_arc(&self) -> Arc<InMemoryAppStore> {
        Arc::new(self.store.clone())
    }
}

pub fn user(name: &str, roles: &[&str]) -> User {
    User {
        id: UserId::new_random(),
        username: name.to_string(),
        roles: roles.iter().map(|role| (*role).to_string()).collect(),
    }
}

pub fn connected_agent(name: &str) -> WorkspaceAgent {
    WorkspaceAgent {
        id: AgentId::new_random(),
        name: name.to_string(),
        created_at: NOW - Duration::hours(1),
        first_connected_at: Some(NOW - Duration::hours(1)),
        last_connected_at: Some(NOW - Duration::seconds(5)),
        disconnected_at: None,
        connection_timeout_seconds: 120,
    }
}

pub fn app(agent: &WorkspaceAgent, slug: &str, sharing_level: Option<SharingLevel>) -> WorkspaceApp {
    WorkspaceApp {
        id: AppId::new_random(),
        agent_id: agent.id,
        slug: slug.to_string(),
        url: format!("http://127.0.0.1:{}", 8000 + slug.len()),
        sharing_level,
    }
}

/// Builds alice's running workspace `dev` with agent `main` and apps
/// `code` (owner), `shared` (authenticated), and `site` (public).
pub fn world() -> World {
    let store = InMemoryAppStore::new();
    let owner = user("alice", &[]);
    let other = user("bob", &[]);
    let site_admin = user("root", &["owner"]);
    for user in [&owner, &other, &site_admin] {
        store.insert_user(user.clone()).unwrap();
    }
    let workspace = Workspace {
        id: WorkspaceId::new_random(),
        owner_id: owner.id,
        owner_username: owner.username.clone(),
        name: "dev".to_string(),
    };
    store.insert_workspace(workspace.clone()).unwrap();
    store
        .insert_build(WorkspaceBuild {
            workspace_id: workspace.id,
            build_number: 1,
            transition: WorkspaceTransition::Start,
        })
        .unwrap();
    let agent = connected_agent("main");
    store.insert_agent(workspace.id, agent.clone()).unwrap();
    store.insert_app(app(&agent, "code", None)).unwrap();
    store.insert_app(app(&agent, "shared", Some(SharingLevel::Authenticated))).unwrap();
    store.insert_app(app(&agent, "site", Some(SharingLevel::Public))).unwrap();
    World {
        store,
        owner,
        other,
        site_admin,
        workspace,
        agent,
    }
}
