// crates/workspace-apps-server/src/direct.rs
// ============================================================================
// Module: Direct Token Authority
// Description: Issue signed app tokens from the control plane's own store.
// Purpose: Run authenticate, resolve, authorize, health-check, and sign.
// Dependencies: axum, tracing, url, workspace-apps-core
// ============================================================================

//! ## Overview
//! [`DirectTokenAuthority`] is the issuing state machine:
//!
//! 1. normalize and check the request (500 on violation),
//! 2. authenticate the optional session token,
//! 3. resolve owner, workspace, agent and app (404, 400 offline, or 500),
//! 4. authorize; denied callers with credentials get a 404 carrying the
//!    authorizer warnings, anonymous callers are redirected to log in
//!    (terminals get a 404 instead),
//! 5. require a connected agent (502 naming the observed state),
//! 6. sign a token that expires after the configured lifetime.
//!
//! Every decision that resolved an app is recorded in the audit sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Redirect;
use axum::response::Response;
use time::Duration;
use url::Url;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::AgentStatus;
use workspace_apps_core::AppAccessPolicy;
use workspace_apps_core::AppAuthorizer;
use workspace_apps_core::AppResolver;
use workspace_apps_core::Clock;
use workspace_apps_core::IssueTokenRequest;
use workspace_apps_core::REDIRECT_URI_QUERY_PARAMETER;
use workspace_apps_core::RegisteredClaims;
use workspace_apps_core::ResolveError;
use workspace_apps_core::ResolvedApp;
use workspace_apps_core::SignedToken;
use workspace_apps_core::SigningKeycache;
use workspace_apps_core::UserId;
use workspace_apps_core::sign_token;

use crate::apikey::ApiKeyAuthenticator;
use crate::apikey::app_session_token;
use crate::audit::AppAccessAuditEvent;
use crate::audit::AppAccessAuditParams;
use crate::audit::AppAuditSink;
use crate::pages::ErrorPage;
use crate::params::CREDENTIAL_QUERY_PARAMETERS;
use crate::params::strip_query_params;
use crate::provider::IssuedToken;
use crate::provider::SignedTokenProvider;
use crate::provider::token_from_request;
use crate::server::Collaborators;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Control plane endpoint that hands a session to an app host.
pub const AUTH_REDIRECT_PATH: &str = "/api/v2/applications/auth-redirect";
/// Dashboard login page.
pub const LOGIN_PATH: &str = "/login";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Deployment settings for a [`DirectTokenAuthority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectAuthoritySettings {
    /// Dashboard access URL.
    pub dashboard_url: Url,
    /// Lifetime of issued tokens.
    pub token_lifetime: Duration,
    /// Heartbeat age after which an agent counts as disconnected.
    pub agent_inactive_timeout: Duration,
    /// Path app isolation switches.
    pub policy: AppAccessPolicy,
}

/// Token authority backed by the platform store.
pub struct DirectTokenAuthority {
    /// Request to record resolution.
    resolver: AppResolver,
    /// Sharing-level decision engine.
    authorizer: AppAuthorizer,
    /// Optional caller authentication.
    authenticator: ApiKeyAuthenticator,
    /// Signing keys.
    keycache: Arc<dyn SigningKeycache>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn AppAuditSink>,
    /// Deployment settings.
    settings: DirectAuthoritySettings,
}

impl DirectTokenAuthority {
    /// Builds an authority over the given collaborators.
    #[must_use]
    pub fn new(collaborators: &Collaborators, settings: DirectAuthoritySettings) -> Self {
        Self {
            resolver: AppResolver::new(Arc::clone(&collaborators.store)),
            authorizer: AppAuthorizer::new(Arc::clone(&collaborators.rbac), settings.policy),
            authenticator: ApiKeyAuthenticator::new(
                Arc::clone(&collaborators.api_keys),
                Arc::clone(&collaborators.store),
                Arc::clone(&collaborators.clock),
            ),
            keycache: Arc::clone(&collaborators.signing),
            clock: Arc::clone(&collaborators.clock),
            audit: Arc::clone(&collaborators.audit),
            settings,
        }
    }

    /// Records the outcome of a decision about `app`.
    fn record(&self, caller: Option<UserId>, app: &ResolvedApp, status: StatusCode) {
        self.audit.record(&AppAccessAuditEvent::new(AppAccessAuditParams {
            timestamp: self.clock.now(),
            user_id: caller,
            workspace_owner: app.workspace.owner_username.clone(),
            workspace_id: app.workspace.id,
            workspace_name: app.workspace.name.clone(),
            agent_id: app.agent.id,
            app: app.request.app_slug_or_port.clone(),
            access_method: app.request.access_method,
            status: status.as_u16(),
        }));
    }

    /// Redirects an anonymous caller towards a login.
    ///
    /// Path apps served from the dashboard host go straight to the login
    /// page; everything else goes through the auth-redirect handoff so the
    /// app host ends up with its own session cookie.
    fn login_redirect(&self, parts: &Parts, issue: &IssueTokenRequest) -> Response {
        let mut redirect_uri = match issue.app_base_url() {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(error = %err, "could not build app base url");
                return ErrorPage::internal_error(format!("Could not build app URL: {err}")).render(&parts.headers);
            }
        };
        if !issue.app_path.is_empty() {
            let path = format!(
                "{}/{}",
                redirect_uri.path().trim_end_matches('/'),
                issue.app_path.trim_start_matches('/')
            );
            redirect_uri.set_path(&path);
        }
        let query = strip_query_params(&issue.app_query, CREDENTIAL_QUERY_PARAMETERS);
        redirect_uri.set_query(if query.is_empty() { None } else { Some(&query) });

        let dashboard = &self.settings.dashboard_url;
        let mut location = dashboard.clone();
        location.set_query(None);
        if issue.app_request.access_method == AccessMethod::Path && same_origin(&redirect_uri, dashboard) {
            let target = match redirect_uri.query() {
                Some(query) => format!("{}?{query}", redirect_uri.path()),
                None => redirect_uri.path().to_string(),
            };
            location.set_path(LOGIN_PATH);
            location.query_pairs_mut().append_pair("redirect", &target);
        } else {
            location.set_path(AUTH_REDIRECT_PATH);
            location.query_pairs_mut().append_pair(REDIRECT_URI_QUERY_PARAMETER, redirect_uri.as_str());
        }
        Redirect::to(location.as_str()).into_response()
    }
}

#[async_trait]
impl SignedTokenProvider for DirectTokenAuthority {
    async fn from_request(&self, parts: &Parts) -> Option<SignedToken> {
        token_from_request(self.keycache.as_ref(), self.clock.now(), parts).await
    }

    async fn issue(&self, parts: &Parts, request: IssueTokenRequest) -> Result<IssuedToken, Response> {
        let headers = &parts.headers;
        let app_request = request.app_request.normalize();
        if let Err(err) = app_request.check() {
            tracing::warn!(error = %err, base_path = %app_request.base_path, "invalid app request");
            return Err(ErrorPage::internal_error(format!("Invalid app request: {err}")).render(headers));
        }
        let access_method = app_request.access_method;
        let issue = IssueTokenRequest {
            app_request,
            ..request
        };

        let session_token = if issue.session_token.is_empty() {
            app_session_token(headers, access_method)
        } else {
            Some(issue.session_token.clone())
        };
        let caller = match session_token {
            Some(token) => self.authenticator.authenticate(&token).await.map_err(|err| {
                tracing::warn!(error = %err, "could not authenticate app request");
                ErrorPage::internal_error("Could not authenticate request.").render(headers)
            })?,
            None => None,
        };
        let caller_id = caller.as_ref().map(|caller| caller.subject.user_id);

        let app = match self.resolver.resolve(&issue.app_request).await {
            Ok(app) => app,
            Err(ResolveError::NotFound(what)) => {
                tracing::debug!(%what, base_path = %issue.app_request.base_path, "app not found");
                return Err(ErrorPage::not_found(Vec::new()).render(headers));
            }
            Err(ResolveError::WorkspaceStopped) => {
                return Err(ErrorPage::workspace_offline().render(headers));
            }
            Err(err) => {
                tracing::warn!(error = %err, base_path = %issue.app_request.base_path, "could not resolve app");
                return Err(ErrorPage::internal_error(format!("Could not resolve app: {err}")).render(headers));
            }
        };

        let outcome = self
            .authorizer
            .authorize(caller.as_ref().map(|caller| &caller.subject), &app)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "app authorization failed");
                ErrorPage::internal_error("Could not verify authorization.").render(headers)
            })?;
        if !outcome.allowed {
            if caller.is_some() || access_method == AccessMethod::Terminal {
                tracing::debug!(
                    user_id = %caller_id.map_or_else(String::new, |id| id.to_string()),
                    workspace_id = %app.workspace.id,
                    app = %app.request.app_slug_or_port,
                    "app access denied"
                );
                self.record(caller_id, &app, StatusCode::NOT_FOUND);
                return Err(ErrorPage::not_found(outcome.warnings).render(headers));
            }
            return Err(self.login_redirect(parts, &issue));
        }

        let now = self.clock.now();
        let status = app.agent.status(now, self.settings.agent_inactive_timeout);
        if status != AgentStatus::Connected {
            self.record(caller_id, &app, StatusCode::BAD_GATEWAY);
            return Err(ErrorPage::unavailable(format!(
                "Agent state is \"{status}\", not \"{}\".",
                AgentStatus::Connected
            ))
            .render(headers));
        }

        let token = SignedToken {
            claims: RegisteredClaims {
                exp: Some((now + self.settings.token_lifetime).unix_timestamp()),
                ..RegisteredClaims::default()
            },
            request: issue.app_request.clone(),
            user_id: app.workspace.owner_id,
            workspace_id: app.workspace.id,
            agent_id: app.agent.id,
            app_url: app.app_url.clone(),
        };
        if !token.matches_request(&issue.app_request) {
            tracing::warn!(base_path = %issue.app_request.base_path, "issued token does not match request");
            return Err(ErrorPage::internal_error("Issued token does not match the request.").render(headers));
        }
        let serialized = sign_token(self.keycache.as_ref(), &token).await.map_err(|err| {
            tracing::warn!(error = %err, "could not sign app token");
            ErrorPage::internal_error("Could not sign token.").render(headers)
        })?;
        self.record(caller_id, &app, StatusCode::OK);
        Ok(IssuedToken {
            token,
            serialized,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when both URLs share scheme, host and port.
fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
}
