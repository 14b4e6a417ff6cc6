// crates/workspace-apps-server/tests/app_routes.rs
// ============================================================================
// Module: App Route Tests
// Description: Path, subdomain, and terminal requests through the router.
// Purpose: Cover issuance, cookie reuse, redirects, and error pages.
// Dependencies: workspace-apps-server, workspace-apps-core, tokio, tower
// ============================================================================

//! End-to-end app routing tests against an in-process control plane.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap for clarity."
)]

mod common;

use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::ACCEPT;
use time::Duration;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::SIGNED_APP_TOKEN_COOKIE;
use workspace_apps_core::SIGNED_APP_TOKEN_QUERY_PARAMETER;

use crate::common::CODE_APP_HOST;
use crate::common::DASHBOARD_HOST;
use crate::common::NOW;
use crate::common::body_json;
use crate::common::body_text;
use crate::common::control_plane;
use crate::common::cookie_pair;
use crate::common::get;
use crate::common::get_with_cookie;
use crate::common::location;
use crate::common::send;
use crate::common::set_cookie;

/// Base path of alice's `code` app.
const CODE_PATH: &str = "/@alice/dev/apps/code/";

// ============================================================================
// SECTION: Path Apps
// ============================================================================

#[tokio::test]
async fn owner_gets_token_cookie_then_reuses_it() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.owner_token);

    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).expect("token cookie");
    assert!(cookie.contains("Path=/@alice/dev/apps/code/"));
    assert!(cookie.contains("Max-Age=60"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));
    let body = body_json(response).await;
    assert_eq!(body["access_method"], "path");
    assert_eq!(body["path"], CODE_PATH);
    assert_eq!(body["workspace_id"], harness.world.workspace.id.to_string());
    assert_eq!(harness.audit.statuses(), vec![200]);

    let token_only = cookie_pair(&cookie);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&token_only)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).is_none());
    assert_eq!(harness.audit.statuses(), vec![200], "reused tokens skip issuance");
}

#[tokio::test]
async fn token_for_one_app_does_not_open_another() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&session)).await;
    let token_only = cookie_pair(&set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).unwrap());

    let response =
        get_with_cookie(harness.router(), DASHBOARD_HOST, "/@alice/dev/apps/other/", Some(&token_only)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_token_is_treated_as_absent() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&session)).await;
    let token_only = cookie_pair(&set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).unwrap());

    let later = NOW + Duration::minutes(2);
    harness.clock.set(later);
    harness.world.heartbeat(later);

    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&token_only)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let both = format!("{token_only}; {session}");
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&both)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).is_some());
}

#[tokio::test]
async fn anonymous_path_app_redirects_to_login_without_credentials() {
    let harness = control_plane().await;
    let uri = format!("{CODE_PATH}?{SIGNED_APP_TOKEN_QUERY_PARAMETER}=junk&foo=1");
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.starts_with("http://dash.test/login?redirect="), "{location}");
    assert!(location.contains("%40alice"));
    assert!(location.contains("foo%3D1"));
    assert!(!location.contains("coder_signed_app_token"));
    assert!(harness.audit.events().is_empty());
}

#[tokio::test]
async fn public_app_is_open_to_anonymous_callers() {
    let harness = control_plane().await;
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, "/@alice/dev/apps/site/", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER, "path apps are owner-only by default");

    let response = get_with_cookie(harness.router(), CODE_APP_HOST.replace("code", "site").as_str(), "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let events = harness.audit.events();
    assert_eq!(events.last().unwrap().access_method, AccessMethod::Subdomain);
    assert_eq!(events.last().unwrap().user_id, None);
}

#[tokio::test]
async fn other_user_gets_not_found() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.other_token);
    let response = send(
        harness.router(),
        get(DASHBOARD_HOST, CODE_PATH)
            .header("cookie", session)
            .header(ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Application Not Found");
    let events = harness.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, 404);
    assert_eq!(events[0].user_id, Some(harness.world.other.id));
}

#[tokio::test]
async fn missing_trailing_slash_redirects_and_keeps_query() {
    let harness = control_plane().await;
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, "/@alice/dev/apps/code?x=1", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/@alice/dev/apps/code/?x=1");

    let uri = "/@alice/dev/apps/code?coder_signed_app_token_23db1dde=SECRET&x=1\
               &coder_application_connect_api_key_35e783=KEY";
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, uri, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/@alice/dev/apps/code/?x=1");
}

#[tokio::test]
async fn unknown_dashboard_path_is_not_found() {
    let harness = control_plane().await;
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, "/api/v2/users/me", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("<h1>404 - Not Found</h1>"));
}

// ============================================================================
// SECTION: Workspace and Agent State
// ============================================================================

#[tokio::test]
async fn stopped_workspace_is_offline() {
    let harness = control_plane().await;
    harness.world.stop_workspace();
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&session)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Workspace Offline"));
}

#[tokio::test]
async fn disconnected_agent_is_bad_gateway() {
    let harness = control_plane().await;
    harness.world.disconnect(NOW - Duration::seconds(1));
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response = send(
        harness.router(),
        get(DASHBOARD_HOST, CODE_PATH)
            .header("cookie", session)
            .header(ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Agent state is \"disconnected\", not \"connected\".");
    assert_eq!(harness.audit.statuses(), vec![502]);
}

// ============================================================================
// SECTION: Subdomain Apps
// ============================================================================

#[tokio::test]
async fn anonymous_subdomain_app_goes_through_auth_redirect() {
    let harness = control_plane().await;
    let response = get_with_cookie(harness.router(), CODE_APP_HOST, "/src?tab=1", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(
        location.starts_with(
            "http://dash.test/api/v2/applications/auth-redirect?redirect_uri=http%3A%2F%2Fcode--main--dev--alice.apps.test%2Fsrc"
        ),
        "{location}"
    );
    assert!(location.contains("tab%3D1"));
}

#[tokio::test]
async fn subdomain_app_with_session_cookie_is_served() {
    let harness = control_plane().await;
    let session = format!("coder_subdomain_app_session_token={}", harness.world.owner_token);
    let response = get_with_cookie(harness.router(), CODE_APP_HOST, "/index.html", Some(&session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).unwrap();
    assert!(cookie.contains("Path=/;"));
    let body = body_json(response).await;
    assert_eq!(body["access_method"], "subdomain");
    assert_eq!(body["path"], "/index.html");
}

#[tokio::test]
async fn malformed_app_subdomain_is_bad_request() {
    let harness = control_plane().await;
    let response = get_with_cookie(harness.router(), "nonsense.apps.test", "/", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Invalid Application URL"));
}

// ============================================================================
// SECTION: Terminals
// ============================================================================

#[tokio::test]
async fn anonymous_terminal_is_not_found_not_redirected() {
    let harness = control_plane().await;
    let uri = format!("/api/v2/workspaceagents/{}/pty", harness.world.agent.id);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(harness.audit.statuses(), vec![404]);
}

#[tokio::test]
async fn terminal_token_is_accepted_from_the_query() {
    let harness = control_plane().await;
    let uri = format!("/api/v2/workspaceagents/{}/pty", harness.world.agent.id);
    let response = send(
        harness.router(),
        get(DASHBOARD_HOST, &uri)
            .header("coder-session-token", harness.world.owner_token.as_str())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).unwrap();
    let token = cookie_pair(&cookie).trim_start_matches("coder_signed_app_token=").to_string();

    let with_query = format!("{uri}?{SIGNED_APP_TOKEN_QUERY_PARAMETER}={token}");
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, &with_query, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).is_none());
    assert_eq!(body_json(response).await["access_method"], "terminal");
}

#[tokio::test]
async fn path_token_in_query_is_ignored() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&session)).await;
    let token = cookie_pair(&set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).unwrap())
        .trim_start_matches("coder_signed_app_token=")
        .to_string();

    let uri = format!("{CODE_PATH}?{SIGNED_APP_TOKEN_QUERY_PARAMETER}={token}");
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

// ============================================================================
// SECTION: Stats
// ============================================================================

#[tokio::test]
async fn served_request_is_reported_as_a_session() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, CODE_PATH, Some(&session)).await;
    assert_eq!(response.status(), StatusCode::OK);

    harness.server.stats().flush().await.unwrap();
    let reports = harness.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].slug_or_port, "code");
    assert_eq!(reports[0].access_method, AccessMethod::Path);
    assert_eq!(reports[0].user_id, harness.world.owner.id);
    assert_eq!(reports[0].requests, 1);
}
