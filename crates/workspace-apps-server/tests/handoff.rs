// crates/workspace-apps-server/tests/handoff.rs
// ============================================================================
// Module: Login Handoff Tests
// Description: Auth-redirect issuance and app host redemption.
// Purpose: Cover the cross-domain session flow and its target checks.
// Dependencies: workspace-apps-server, workspace-apps-core, tokio, url
// ============================================================================

//! Tests for moving a dashboard session onto a wildcard app host.

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

use axum::http::StatusCode;
use url::form_urlencoded;
use workspace_apps_core::APP_CONNECT_API_KEY_QUERY_PARAMETER;
use workspace_apps_core::PATH_APP_SESSION_TOKEN_COOKIE;
use workspace_apps_core::SIGNED_APP_TOKEN_COOKIE;
use workspace_apps_core::SUBDOMAIN_APP_SESSION_TOKEN_COOKIE;

use crate::common::CODE_APP_HOST;
use crate::common::DASHBOARD_HOST;
use crate::common::Harness;
use crate::common::body_json;
use crate::common::body_text;
use crate::common::control_plane;
use crate::common::cookie_pair;
use crate::common::get_with_cookie;
use crate::common::location;
use crate::common::set_cookie;

/// Auth-redirect URI asking for a session on `redirect_uri`.
fn auth_redirect_uri(redirect_uri: &str) -> String {
    let query: String =
        form_urlencoded::Serializer::new(String::new()).append_pair("redirect_uri", redirect_uri).finish();
    format!("/api/v2/applications/auth-redirect?{query}")
}

/// Runs the issuer leg as the owner and returns the app URL it redirects to.
async fn handoff_location(harness: &Harness, redirect_uri: &str) -> String {
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response =
        get_with_cookie(harness.router(), DASHBOARD_HOST, &auth_redirect_uri(redirect_uri), Some(&session)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    location(&response)
}

/// Splits an absolute URL into host and path-with-query.
fn host_and_uri(absolute: &str) -> (String, String) {
    let url = url::Url::parse(absolute).unwrap();
    let uri = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    (url.host_str().unwrap().to_string(), uri)
}

// ============================================================================
// SECTION: Issuer
// ============================================================================

#[tokio::test]
async fn anonymous_auth_redirect_goes_to_login() {
    let harness = control_plane().await;
    let uri = auth_redirect_uri(&format!("http://{CODE_APP_HOST}/"));
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(
        location.starts_with("http://dash.test/login?redirect=%2Fapi%2Fv2%2Fapplications%2Fauth-redirect"),
        "{location}"
    );
}

#[tokio::test]
async fn missing_redirect_uri_is_bad_request() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.owner_token);
    let response =
        get_with_cookie(harness.router(), DASHBOARD_HOST, "/api/v2/applications/auth-redirect", Some(&session)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Missing redirect_uri"));
}

#[tokio::test]
async fn untrusted_redirect_hosts_are_rejected() {
    let harness = control_plane().await;
    let session = format!("coder_session_token={}", harness.world.owner_token);
    for target in ["http://evil.test/", "http://apps.test/", "http://nonsense.apps.test/", "not a url"] {
        let response =
            get_with_cookie(harness.router(), DASHBOARD_HOST, &auth_redirect_uri(target), Some(&session)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{target}");
    }
}

#[tokio::test]
async fn issued_redirect_carries_one_encrypted_key_and_keeps_the_query() {
    let harness = control_plane().await;
    let target = format!("http://{CODE_APP_HOST}/?foo=1&{APP_CONNECT_API_KEY_QUERY_PARAMETER}=stale");
    let location = handoff_location(&harness, &target).await;
    let prefix = format!("http://{CODE_APP_HOST}/?foo=1&{APP_CONNECT_API_KEY_QUERY_PARAMETER}=");
    assert!(location.starts_with(&prefix), "{location}");
    assert!(!location.contains("stale"));
    assert_eq!(location.matches(APP_CONNECT_API_KEY_QUERY_PARAMETER).count(), 1);
}

#[tokio::test]
async fn redirect_scheme_follows_the_dashboard() {
    let harness = control_plane().await;
    let location = handoff_location(&harness, &format!("https://{CODE_APP_HOST}/")).await;
    assert!(location.starts_with(&format!("http://{CODE_APP_HOST}/?")), "{location}");
}

// ============================================================================
// SECTION: Redeemer
// ============================================================================

#[tokio::test]
async fn full_subdomain_handoff_opens_the_app() {
    let harness = control_plane().await;
    let location = handoff_location(&harness, &format!("http://{CODE_APP_HOST}/?foo=1")).await;
    let (host, uri) = host_and_uri(&location);
    assert_eq!(host, CODE_APP_HOST);

    let response = get_with_cookie(harness.router(), &host, &uri, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(crate::common::location(&response), "/?foo=1");
    let session_cookie = set_cookie(&response, SUBDOMAIN_APP_SESSION_TOKEN_COOKIE).expect("app session cookie");
    assert!(session_cookie.contains("Path=/;"));
    assert!(session_cookie.contains("Domain=.apps.test"));
    assert!(harness.audit.events().is_empty(), "redemption is not an access decision");

    let app_session = cookie_pair(&session_cookie);
    let response = get_with_cookie(harness.router(), &host, "/?foo=1", Some(&app_session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response, SIGNED_APP_TOKEN_COOKIE).is_some());
    let body = body_json(response).await;
    assert_eq!(body["access_method"], "subdomain");
    assert_eq!(harness.audit.statuses(), vec![200]);
}

#[tokio::test]
async fn handed_off_key_only_connects_to_apps() {
    let harness = control_plane().await;
    let location = handoff_location(&harness, &format!("http://{CODE_APP_HOST}/")).await;
    let (host, uri) = host_and_uri(&location);
    let response = get_with_cookie(harness.router(), &host, &uri, None).await;
    let app_session = cookie_pair(&set_cookie(&response, SUBDOMAIN_APP_SESSION_TOKEN_COOKIE).unwrap());
    let key = app_session.split_once('=').unwrap().1.to_string();

    let as_session = format!("coder_session_token={key}");
    let response = get_with_cookie(harness.router(), &host, "/", Some(&as_session)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let terminal = format!("/api/v2/workspaceagents/{}/pty", harness.world.agent.id);
    let response = get_with_cookie(harness.router(), DASHBOARD_HOST, &terminal, Some(&as_session)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND, "terminals need more than an app connect key");
}

#[tokio::test]
async fn undecryptable_key_is_bad_request() {
    let harness = control_plane().await;
    let uri = format!("/?{APP_CONNECT_API_KEY_QUERY_PARAMETER}=garbage");
    let response = get_with_cookie(harness.router(), CODE_APP_HOST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Could not decrypt API key"));
}

#[tokio::test]
async fn key_from_another_deployment_is_rejected() {
    let harness = control_plane().await;
    let foreign = control_plane().await;
    let location = handoff_location(&foreign, &format!("http://{CODE_APP_HOST}/")).await;
    let (host, uri) = host_and_uri(&location);
    let response = get_with_cookie(harness.router(), &host, &uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn path_app_redemption_sets_the_path_session_cookie() {
    let harness = control_plane().await;
    let location = handoff_location(&harness, &format!("http://{CODE_APP_HOST}/")).await;
    let (_, uri) = host_and_uri(&location);
    let key = uri.split_once('?').unwrap().1;

    let response =
        get_with_cookie(harness.router(), DASHBOARD_HOST, &format!("/@alice/dev/apps/code/?{key}"), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(crate::common::location(&response), "/@alice/dev/apps/code/");
    let cookie = set_cookie(&response, PATH_APP_SESSION_TOKEN_COOKIE).expect("path session cookie");
    assert!(!cookie.contains("Domain="));
}
