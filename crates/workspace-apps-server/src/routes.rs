// crates/workspace-apps-server/src/routes.rs
// ============================================================================
// Module: App Routes
// Description: axum routers for path, subdomain, and terminal app access.
// Purpose: Map incoming requests onto app requests, tokens, and forwarding.
// Dependencies: axum, subtle, tower, tracing, workspace-apps-core
// ============================================================================

//! ## Overview
//! The top-level router dispatches on the `Host` header. Hosts matching the
//! configured app hostname pattern are subdomain app requests; every other
//! request goes to the dashboard router, which serves path apps
//! (`/@user/workspace.agent/apps/app/...`), agent terminals, and (on the
//! control plane) the auth-redirect and proxy endpoints.
//!
//! Every app request runs the same pipeline: redeem a handed-off API key if
//! present, reuse or issue a signed token, record a stats session around the
//! forwarded call, and set the token cookie on the way out.
//! Security posture: proxy endpoints compare tokens in constant time and all
//! request data is untrusted until normalized and checked.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::HOST;
use axum::http::header::SET_COOKIE;
use axum::response::IntoResponse;
use axum::response::Redirect;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::de::DeserializeOwned;
use serde_json::json;
use subtle::ConstantTimeEq;
use tower::ServiceExt;
use url::Url;
use workspace_apps_core::ApplicationUrl;
use workspace_apps_core::Clock;
use workspace_apps_core::HostnamePattern;
use workspace_apps_core::IssueTokenRequest;
use workspace_apps_core::PROXY_TOKEN_HEADER;
use workspace_apps_core::Request as AppRequest;
use workspace_apps_core::StatsReport;
use workspace_apps_core::StatsReporter;

use crate::client::APP_STATS_PATH;
use crate::client::ISSUE_SIGNED_APP_TOKEN_PATH;
use crate::client::IssueSignedAppTokenResponse;
use crate::client::ReportAppStatsRequest;
use crate::direct::AUTH_REDIRECT_PATH;
use crate::direct::DirectTokenAuthority;
use crate::forward::AppForwarder;
use crate::handoff::HandoffIssuer;
use crate::handoff::HandoffRedeemer;
use crate::pages::ErrorPage;
use crate::params::CREDENTIAL_QUERY_PARAMETERS;
use crate::params::strip_query_params;
use crate::params::with_query;
use crate::provider::SignedTokenProvider;
use crate::provider::TokenCookieSettings;
use crate::provider::resolve_request;
use crate::stats::StatsCollector;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Terminal endpoint prefix; the agent UUID follows.
pub const TERMINAL_PATH: &str = "/api/v2/workspaceagents/{agent}/pty";
/// Largest proxy endpoint body accepted.
const MAX_PROXY_BODY_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: State
// ============================================================================

/// Endpoints only the control plane serves.
pub struct ControlPlaneRoutes {
    /// Auth-redirect handoff issuer.
    pub handoff: HandoffIssuer,
    /// Authority used for tokens requested by proxies.
    pub direct: Arc<DirectTokenAuthority>,
    /// Destination for stats uploaded by proxies.
    pub reporter: Arc<dyn StatsReporter>,
    /// Accepted proxy tokens.
    pub proxy_tokens: Vec<String>,
}

/// Everything the handlers need.
pub struct RouteContext {
    /// Token provider for app requests.
    pub provider: Arc<dyn SignedTokenProvider>,
    /// Session stats sink.
    pub stats: Arc<StatsCollector>,
    /// Upstream forwarding.
    pub forwarder: Arc<dyn AppForwarder>,
    /// Handoff redemption on this host.
    pub redeemer: HandoffRedeemer,
    /// Control plane endpoints, absent on a proxy.
    pub control_plane: Option<ControlPlaneRoutes>,
    /// Public URL of this host; path apps are built on it.
    pub access_url: Url,
    /// Wildcard hostname for subdomain apps.
    pub app_hostname: Option<HostnamePattern>,
    /// Signed token cookie settings.
    pub cookie: TokenCookieSettings,
    /// Time source for stats sessions.
    pub clock: Arc<dyn Clock>,
}

/// Shared router state.
#[derive(Clone)]
struct AppState {
    /// Handler context.
    context: Arc<RouteContext>,
}

// ============================================================================
// SECTION: Routers
// ============================================================================

/// Builds the host-dispatching router.
#[must_use]
pub fn router(context: RouteContext) -> Router {
    let state = AppState {
        context: Arc::new(context),
    };
    let dashboard = dashboard_router(state.clone());
    Router::new().fallback(move |request: Request<Body>| {
        let state = state.clone();
        let dashboard = dashboard.clone();
        async move { dispatch(state, dashboard, request).await }
    })
}

/// Routes served on the dashboard (or proxy) host.
fn dashboard_router(state: AppState) -> Router {
    let mut router = Router::new().route(TERMINAL_PATH, get(terminal).post(terminal));
    if state.context.control_plane.is_some() {
        router = router
            .route(AUTH_REDIRECT_PATH, get(auth_redirect))
            .route(ISSUE_SIGNED_APP_TOKEN_PATH, post(issue_signed_app_token))
            .route(APP_STATS_PATH, post(report_app_stats));
    }
    router.fallback(path_app).with_state(state)
}

/// Sends subdomain app hosts to the app pipeline and the rest to the dashboard.
async fn dispatch(state: AppState, dashboard: Router, request: Request<Body>) -> Response {
    let subdomain = state
        .context
        .app_hostname
        .as_ref()
        .and_then(|pattern| request_host(&request).and_then(|host| pattern.match_host(host)));
    if let Some(subdomain) = subdomain {
        return subdomain_app(&state, &subdomain, request).await;
    }
    match dashboard.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// Host the request was addressed to.
fn request_host(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
}

// ============================================================================
// SECTION: App Handlers
// ============================================================================

/// Serves an app addressed by wildcard subdomain.
async fn subdomain_app(state: &AppState, subdomain: &str, request: Request<Body>) -> Response {
    let app = match ApplicationUrl::parse_subdomain(subdomain) {
        Ok(app) => app,
        Err(err) => {
            tracing::debug!(error = %err, %subdomain, "invalid application subdomain");
            return ErrorPage::bad_request(
                "Invalid Application URL",
                format!("Could not parse subdomain application URL \"{subdomain}\": {err}"),
            )
            .render(request.headers());
        }
    };
    let app_path = request.uri().path().to_string();
    serve_app(state, AppRequest::subdomain_app(&app), app_path, request).await
}

/// Serves an app addressed by path on the dashboard host.
async fn path_app(State(state): State<AppState>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let Some(target) = PathAppTarget::parse(&path) else {
        return ErrorPage::new(StatusCode::NOT_FOUND, "Not Found", "The requested page does not exist.")
            .render(request.headers());
    };
    let Some(app_path) = target.app_path else {
        let slashed = format!("{path}/");
        let query =
            strip_query_params(request.uri().query().unwrap_or_default(), CREDENTIAL_QUERY_PARAMETERS);
        return Redirect::to(&with_query(&slashed, &query)).into_response();
    };
    let app_request =
        AppRequest::path_app(target.base_path, target.username, target.workspace_and_agent, target.app);
    serve_app(&state, app_request, app_path, request).await
}

/// Serves an agent terminal.
async fn terminal(State(state): State<AppState>, Path(agent): Path<String>, request: Request<Body>) -> Response {
    let base_path = format!("/api/v2/workspaceagents/{agent}/pty");
    serve_app(&state, AppRequest::terminal(base_path, agent), String::new(), request).await
}

/// Shared app pipeline: redeem, resolve a token, forward with stats.
async fn serve_app(state: &AppState, app_request: AppRequest, app_path: String, request: Request<Body>) -> Response {
    let context = &state.context;
    let (parts, body) = request.into_parts();
    if let Some(response) = context.redeemer.redeem(&parts, app_request.access_method).await {
        return response;
    }

    let issue = IssueTokenRequest {
        app_request,
        path_app_base_url: context.access_url.to_string(),
        app_hostname: context.app_hostname.as_ref().map(ToString::to_string).unwrap_or_default(),
        app_path,
        app_query: parts.uri.query().unwrap_or_default().to_string(),
        session_token: String::new(),
    };
    let resolved = match resolve_request(context.provider.as_ref(), &parts, issue, context.cookie).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    let session = StatsReport::from_token(&resolved.token, context.clock.now());
    context.stats.collect(session.clone());
    let mut response = context.forwarder.forward(&resolved.token, Request::from_parts(parts, body)).await;
    context.stats.collect(StatsReport {
        session_ended_at: Some(context.clock.now()),
        ..session
    });

    if let Some(cookie) = resolved.set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

// ============================================================================
// SECTION: Path App Parsing
// ============================================================================

/// Path app coordinates parsed from a dashboard URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathAppTarget {
    /// Owner username or ID, without the `@`.
    username: String,
    /// Combined `workspace[.agent]` segment.
    workspace_and_agent: String,
    /// App slug or port.
    app: String,
    /// `/@user/workspace/apps/app/`.
    base_path: String,
    /// Remainder after the base path (starting with `/`); `None` when the
    /// URL lacks the trailing slash after the app segment.
    app_path: Option<String>,
}

impl PathAppTarget {
    /// Parses `/@{user}/{workspace_and_agent}/apps/{app}[/rest]`.
    fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix("/@")?;
        let mut segments = rest.splitn(5, '/');
        let username = segments.next().filter(|segment| !segment.is_empty())?;
        let workspace_and_agent = segments.next().filter(|segment| !segment.is_empty())?;
        if segments.next()? != "apps" {
            return None;
        }
        let app = segments.next().filter(|segment| !segment.is_empty())?;
        let base_path = format!("/@{username}/{workspace_and_agent}/apps/{app}/");
        let app_path = segments.next().map(|remainder| format!("/{remainder}"));
        Some(Self {
            username: username.to_string(),
            workspace_and_agent: workspace_and_agent.to_string(),
            app: app.to_string(),
            base_path,
            app_path,
        })
    }
}

// ============================================================================
// SECTION: Control Plane Handlers
// ============================================================================

/// `GET /api/v2/applications/auth-redirect`.
async fn auth_redirect(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(control_plane) = &state.context.control_plane else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let (parts, _) = request.into_parts();
    control_plane.handoff.auth_redirect(&parts).await
}

/// `POST /api/v2/workspaceproxies/me/issue-signed-app-token`.
async fn issue_signed_app_token(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(control_plane) = &state.context.control_plane else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let (parts, body) = request.into_parts();
    if !proxy_authorized(&parts.headers, &control_plane.proxy_tokens) {
        return proxy_unauthorized();
    }
    let issue: IssueTokenRequest = match read_json(body).await {
        Ok(issue) => issue,
        Err(response) => return response,
    };
    match control_plane.direct.issue(&parts, issue).await {
        Ok(issued) => (
            StatusCode::CREATED,
            Json(IssueSignedAppTokenResponse {
                signed_token_str: issued.serialized,
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// `POST /api/v2/workspaceproxies/me/app-stats`.
async fn report_app_stats(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(control_plane) = &state.context.control_plane else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let (parts, body) = request.into_parts();
    if !proxy_authorized(&parts.headers, &control_plane.proxy_tokens) {
        return proxy_unauthorized();
    }
    let upload: ReportAppStatsRequest = match read_json(body).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };
    match control_plane.reporter.report(&upload.stats).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            tracing::warn!(error = %err, count = upload.stats.len(), "could not store proxy app stats");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "Failed to report app stats." })))
                .into_response()
        }
    }
}

/// Returns true when the proxy token header matches a configured token.
fn proxy_authorized(headers: &HeaderMap, tokens: &[String]) -> bool {
    let Some(presented) = headers.get(PROXY_TOKEN_HEADER).and_then(|value| value.to_str().ok()) else {
        return false;
    };
    tokens.iter().fold(false, |matched, token| matched | bool::from(token.as_bytes().ct_eq(presented.as_bytes())))
}

/// 401 for a missing or unknown proxy token.
fn proxy_unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid external proxy token" }))).into_response()
}

/// Reads a bounded JSON body, answering 400 when it does not decode.
async fn read_json<T: DeserializeOwned>(body: Body) -> Result<T, Response> {
    let bytes = axum::body::to_bytes(body, MAX_PROXY_BODY_BYTES).await.map_err(|err| {
        (StatusCode::BAD_REQUEST, Json(json!({ "message": "Could not read request body.", "detail": err.to_string() })))
            .into_response()
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        (StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid request body.", "detail": err.to_string() })))
            .into_response()
    })
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn path_app_target_splits_base_path_and_remainder() {
        let target = PathAppTarget::parse("/@alice/dev.main/apps/code/src/lib.rs").unwrap();
        assert_eq!(target.username, "alice");
        assert_eq!(target.workspace_and_agent, "dev.main");
        assert_eq!(target.app, "code");
        assert_eq!(target.base_path, "/@alice/dev.main/apps/code/");
        assert_eq!(target.app_path.as_deref(), Some("/src/lib.rs"));
    }

    #[test]
    fn path_app_target_without_trailing_slash_has_no_app_path() {
        let target = PathAppTarget::parse("/@alice/dev/apps/8080").unwrap();
        assert_eq!(target.app_path, None);
        let slashed = PathAppTarget::parse("/@alice/dev/apps/8080/").unwrap();
        assert_eq!(slashed.app_path.as_deref(), Some("/"));
    }

    #[test]
    fn path_app_target_rejects_other_paths() {
        assert!(PathAppTarget::parse("/alice/dev/apps/code/").is_none());
        assert!(PathAppTarget::parse("/@alice/dev/terminal/code/").is_none());
        assert!(PathAppTarget::parse("/@alice//apps/code/").is_none());
        assert!(PathAppTarget::parse("/@alice/dev/apps/").is_none());
        assert!(PathAppTarget::parse("/api/v2/users").is_none());
    }

    #[test]
    fn proxy_token_must_match_a_configured_token() {
        let tokens = vec!["first-token".to_string(), "second-token".to_string()];
        let mut headers = HeaderMap::new();
        assert!(!proxy_authorized(&headers, &tokens));
        headers.insert("coder-external-proxy-token", "second-token".parse().unwrap());
        assert!(proxy_authorized(&headers, &tokens));
        headers.insert("coder-external-proxy-token", "second".parse().unwrap());
        assert!(!proxy_authorized(&headers, &tokens));
        assert!(!proxy_authorized(&headers, &[]));
    }
}
