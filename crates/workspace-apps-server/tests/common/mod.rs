// crates/workspace-apps-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Fixtures
// Description: Seeded store, manual clock, and router helpers.
// Purpose: Drive the app routes in-process without a network listener.
// Dependencies: workspace-apps-server, workspace-apps-core, tower, http-body-util
// ============================================================================

//! Shared fixtures for workspace-apps-server integration tests.

#![allow(dead_code, reason = "Each test binary uses a different fixture subset.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Fixture setup failures should abort the test."
)]

use std::sync::Arc;
use std::sync::Mutex;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::http::Response;
use axum::http::header::COOKIE;
use axum::http::header::HOST;
use axum::http::header::LOCATION;
use axum::http::header::SET_COOKIE;
use http_body_util::BodyExt;
use serde_json::Value;
use time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;
use tower::ServiceExt;
use workspace_apps_config::WorkspaceAppsConfig;
use workspace_apps_core::AgentId;
use workspace_apps_core::ApiKey;
use workspace_apps_core::ApiKeyScope;
use workspace_apps_core::ApiKeyStore;
use workspace_apps_core::AppId;
use workspace_apps_core::InMemoryAppStore;
use workspace_apps_core::InMemoryStatsReporter;
use workspace_apps_core::ManualClock;
use workspace_apps_core::RoleAuthorizer;
use workspace_apps_core::SharingLevel;
use workspace_apps_core::StaticKeycache;
use workspace_apps_core::User;
use workspace_apps_core::UserId;
use workspace_apps_core::Workspace;
use workspace_apps_core::WorkspaceAgent;
use workspace_apps_core::WorkspaceApp;
use workspace_apps_core::WorkspaceBuild;
use workspace_apps_core::WorkspaceId;
use workspace_apps_core::WorkspaceTransition;
use workspace_apps_server::AppAccessAuditEvent;
use workspace_apps_server::AppAuditSink;
use workspace_apps_server::AppsServer;
use workspace_apps_server::Collaborators;
use workspace_apps_server::EchoForwarder;

/// Fixed evaluation time for fixtures.
pub const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);
/// Dashboard host of the control plane.
pub const DASHBOARD_HOST: &str = "dash.test";
/// Subdomain of alice's `code` app on agent `main` of workspace `dev`.
pub const CODE_APP_HOST: &str = "code--main--dev--alice.apps.test";
/// Proxy token accepted by the control plane.
pub const PROXY_TOKEN: &str = "proxy-secret-token";

/// Populated store plus handles to the records in it.
pub struct World {
    pub store: InMemoryAppStore,
    pub owner: User,
    pub other: User,
    pub workspace: Workspace,
    pub agent: WorkspaceAgent,
    pub owner_token: String,
    pub other_token: String,
}

impl World {
    /// Moves the agent heartbeat to `at`.
    pub fn heartbeat(&self, at: OffsetDateTime) {
        let mut agent = self.agent.clone();
        agent.last_connected_at = Some(at);
        self.store.update_agent(agent).unwrap();
    }

    /// Marks the agent disconnected at `at`.
    pub fn disconnect(&self, at: OffsetDateTime) {
        let mut agent = self.agent.clone();
        agent.disconnected_at = Some(at);
        self.store.update_agent(agent).unwrap();
    }

    /// Appends a build that stops the workspace.
    pub fn stop_workspace(&self) {
        self.store
            .insert_build(WorkspaceBuild {
                workspace_id: self.workspace.id,
                build_number: 2,
                transition: WorkspaceTransition::Stop,
            })
            .unwrap();
    }
}

/// Builds alice's running workspace `dev` with agent `main` and apps
/// `code` (owner) and `site` (public), plus session keys for alice and bob.
pub async fn world() -> World {
    let store = InMemoryAppStore::new();
    let owner = User {
        id: UserId::new_random(),
        username: "alice".to_string(),
        roles: Vec::new(),
    };
    let other = User {
        id: UserId::new_random(),
        username: "bob".to_string(),
        roles: Vec::new(),
    };
    store.insert_user(owner.clone()).unwrap();
    store.insert_user(other.clone()).unwrap();
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
    let agent = WorkspaceAgent {
        id: AgentId::new_random(),
        name: "main".to_string(),
        created_at: NOW - Duration::hours(1),
        first_connected_at: Some(NOW - Duration::hours(1)),
        last_connected_at: Some(NOW - Duration::seconds(5)),
        disconnected_at: None,
        connection_timeout_seconds: 120,
    };
    store.insert_agent(workspace.id, agent.clone()).unwrap();
    for (slug, sharing_level) in [("code", None), ("site", Some(SharingLevel::Public))] {
        store
            .insert_app(WorkspaceApp {
                id: AppId::new_random(),
                agent_id: agent.id,
                slug: slug.to_string(),
                url: "http://127.0.0.1:8080".to_string(),
                sharing_level,
            })
            .unwrap();
    }
    let owner_token = session_token(&store, owner.id).await;
    let other_token = session_token(&store, other.id).await;
    World {
        store,
        owner,
        other,
        workspace,
        agent,
        owner_token,
        other_token,
    }
}

/// Mints a day-long full-scope session token for `user_id`.
pub async fn session_token(store: &InMemoryAppStore, user_id: UserId) -> String {
    let generated = ApiKey::generate(user_id, NOW + Duration::days(1), 86_400, ApiKeyScope::All);
    store.insert_api_key(generated.key).await.unwrap();
    generated.token
}

/// Audit sink that keeps every event.
#[derive(Default)]
pub struct RecordingAuditSink {
    /// Events in arrival order.
    events: Mutex<Vec<AppAccessAuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AppAccessAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<u16> {
        self.events().into_iter().map(|event| event.status).collect()
    }
}

impl AppAuditSink for RecordingAuditSink {
    fn record(&self, event: &AppAccessAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Control plane config for `dash.test` with wildcard apps on `apps.test`.
pub fn control_plane_config() -> WorkspaceAppsConfig {
    WorkspaceAppsConfig::from_toml(&format!(
        r#"
[server]
bind = "127.0.0.1:0"
access_url = "http://{DASHBOARD_HOST}"
app_hostname = "*.apps.test"
proxy_tokens = ["{PROXY_TOKEN}"]
"#
    ))
    .unwrap()
}

/// Proxy config for `proxy.test` delegating to `primary_url`.
pub fn proxy_config(primary_url: &str) -> WorkspaceAppsConfig {
    WorkspaceAppsConfig::from_toml(&format!(
        r#"
[server]
bind = "127.0.0.1:0"
access_url = "http://proxy.test"

[proxy]
primary_access_url = "{primary_url}"
proxy_token = "{PROXY_TOKEN}"
"#
    ))
    .unwrap()
}

/// A running server plus the fakes behind it.
pub struct Harness {
    pub world: World,
    pub server: AppsServer,
    pub clock: ManualClock,
    pub reporter: InMemoryStatsReporter,
    pub audit: Arc<RecordingAuditSink>,
    pub keycache: StaticKeycache,
}

impl Harness {
    pub fn router(&self) -> Router {
        self.server.router()
    }
}

/// Collaborators over `store` with manual time and recording fakes.
pub fn collaborators(
    store: &InMemoryAppStore,
    keycache: &StaticKeycache,
    clock: &ManualClock,
    reporter: &InMemoryStatsReporter,
    audit: &Arc<RecordingAuditSink>,
) -> Collaborators {
    Collaborators {
        store: Arc::new(store.clone()),
        api_keys: Arc::new(store.clone()),
        rbac: Arc::new(RoleAuthorizer),
        signing: Arc::new(keycache.clone()),
        encryption: Arc::new(keycache.clone()),
        reporter: Arc::new(reporter.clone()),
        clock: Arc::new(clock.clone()),
        audit: Arc::clone(audit) as Arc<dyn AppAuditSink>,
        forwarder: Arc::new(EchoForwarder),
    }
}

/// Control plane over the default world.
pub async fn control_plane() -> Harness {
    let world = world().await;
    let clock = ManualClock::new(NOW);
    let reporter = InMemoryStatsReporter::new();
    let audit = Arc::new(RecordingAuditSink::default());
    let keycache = StaticKeycache::generate();
    let collaborators = collaborators(&world.store, &keycache, &clock, &reporter, &audit);
    let server = AppsServer::from_config(&control_plane_config(), collaborators).unwrap();
    Harness {
        world,
        server,
        clock,
        reporter,
        audit,
        keycache,
    }
}

/// GET request for `uri` addressed to `host`.
pub fn get(host: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri).header(HOST, host)
}

/// Sends `request` through `router`.
pub async fn send(router: Router, request: Request<Body>) -> Response<Body> {
    router.oneshot(request).await.unwrap()
}

/// Sends an empty GET with the given cookie header, if any.
pub async fn get_with_cookie(router: Router, host: &str, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut builder = get(host, uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    send(router, builder.body(Body::empty()).unwrap()).await
}

/// Collects a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collects a response body as text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Returns the `Location` header.
pub fn location<B>(response: &Response<B>) -> String {
    response.headers().get(LOCATION).unwrap().to_str().unwrap().to_string()
}

/// Returns the `Set-Cookie` header for cookie `name`, if set.
pub fn set_cookie<B>(response: &Response<B>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&prefix))
        .map(str::to_string)
}

/// Returns the value part of a `Set-Cookie` header.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}
