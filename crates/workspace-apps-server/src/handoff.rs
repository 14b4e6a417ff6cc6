// crates/workspace-apps-server/src/handoff.rs
// ============================================================================
// Module: Cross-Domain Login Handoff
// Description: Move a dashboard session onto an app host as a scoped API key.
// Purpose: Let subdomain and proxy apps authenticate without shared cookies.
// Dependencies: axum, tracing, url, workspace-apps-core
// ============================================================================

//! ## Overview
//! App hosts cannot read the dashboard session cookie. The handoff bridges
//! that gap in two legs:
//!
//! - [`HandoffIssuer`] (control plane, `GET /api/v2/applications/auth-redirect`)
//!   mints an `application_connect` API key for the logged-in caller,
//!   encrypts it for the app host, and redirects (307) to the requested app
//!   URL with the encrypted key in the query.
//! - [`HandoffRedeemer`] (app host) decrypts the key, stores it in the app
//!   session cookie, and redirects (303) to the same URL without it.
//!
//! Redirect targets are limited to configured app hostnames (with a
//! parseable app subdomain) and trusted proxy hosts, so the endpoint cannot
//! be used to ship keys to arbitrary sites.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Redirect;
use axum::response::Response;
use time::Duration;
use url::Url;
use workspace_apps_core::API_KEY_AUDIENCE;
use workspace_apps_core::API_KEY_ISSUER;
use workspace_apps_core::APP_CONNECT_API_KEY_QUERY_PARAMETER;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::ApiKey;
use workspace_apps_core::ApiKeyScope;
use workspace_apps_core::ApiKeyStore;
use workspace_apps_core::ApplicationUrl;
use workspace_apps_core::ClaimExpectations;
use workspace_apps_core::Clock;
use workspace_apps_core::EncryptedApiKeyPayload;
use workspace_apps_core::EncryptionKeycache;
use workspace_apps_core::HostnamePattern;
use workspace_apps_core::REDIRECT_URI_QUERY_PARAMETER;
use workspace_apps_core::decrypt_payload;
use workspace_apps_core::encrypt_payload;

use crate::apikey::ApiKeyAuthenticator;
use crate::apikey::app_session_cookie;
use crate::apikey::dashboard_session_token;
use crate::direct::LOGIN_PATH;
use crate::pages::ErrorPage;
use crate::params::SetCookie;
use crate::params::query_value;
use crate::params::strip_query_params;
use crate::params::with_query;
use crate::server::Collaborators;

// ============================================================================
// SECTION: Issuer
// ============================================================================

/// Hosts the control plane may hand sessions to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffSettings {
    /// Dashboard access URL.
    pub dashboard_url: Url,
    /// The control plane's own wildcard app hostname.
    pub app_hostname: Option<HostnamePattern>,
    /// Wildcard app hostnames served by trusted proxies.
    pub trusted_proxy_app_hostnames: Vec<HostnamePattern>,
    /// Bare hosts of trusted proxies (path apps on a proxy).
    pub trusted_proxy_hosts: Vec<String>,
    /// Upper bound for minted key lifetimes.
    pub session_duration: Duration,
}

/// Control plane half of the handoff.
pub struct HandoffIssuer {
    /// Dashboard session authentication.
    authenticator: ApiKeyAuthenticator,
    /// Where minted keys are stored.
    api_keys: Arc<dyn ApiKeyStore>,
    /// Encryption keys shared with app hosts.
    encryption: Arc<dyn EncryptionKeycache>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Allowed targets.
    settings: HandoffSettings,
}

impl HandoffIssuer {
    /// Creates an issuer.
    #[must_use]
    pub fn new(collaborators: &Collaborators, settings: HandoffSettings) -> Self {
        Self {
            authenticator: ApiKeyAuthenticator::new(
                Arc::clone(&collaborators.api_keys),
                Arc::clone(&collaborators.store),
                Arc::clone(&collaborators.clock),
            ),
            api_keys: Arc::clone(&collaborators.api_keys),
            encryption: Arc::clone(&collaborators.encryption),
            clock: Arc::clone(&collaborators.clock),
            settings,
        }
    }

    /// Handles `GET /api/v2/applications/auth-redirect`.
    pub async fn auth_redirect(&self, parts: &Parts) -> Response {
        let headers = &parts.headers;
        let caller = match dashboard_session_token(headers) {
            Some(token) => match self.authenticator.authenticate(&token).await {
                Ok(caller) => caller,
                Err(err) => {
                    tracing::warn!(error = %err, "could not authenticate auth-redirect request");
                    return ErrorPage::internal_error("Could not authenticate request.").render(headers);
                }
            },
            None => None,
        };
        let Some(caller) = caller else {
            return self.login_redirect(parts);
        };

        let Some(raw) = query_value(parts.uri.query(), REDIRECT_URI_QUERY_PARAMETER) else {
            return ErrorPage::bad_request("Missing Redirect URI", "Missing redirect_uri query parameter.")
                .render(headers);
        };
        let Ok(mut redirect_uri) = Url::parse(&raw) else {
            return ErrorPage::bad_request("Invalid Redirect URI", "Invalid redirect_uri query parameter.")
                .render(headers);
        };
        if !self.allowed_target(&redirect_uri) {
            tracing::debug!(host = redirect_uri.host_str().unwrap_or_default(), "auth-redirect target rejected");
            return ErrorPage::bad_request(
                "Invalid Redirect URI",
                "The redirect_uri query parameter must be a valid app subdomain or a trusted proxy host.",
            )
            .render(headers);
        }
        if redirect_uri.set_scheme(self.settings.dashboard_url.scheme()).is_err() {
            return ErrorPage::bad_request("Invalid Redirect URI", "Invalid redirect_uri scheme.").render(headers);
        }

        let now = self.clock.now();
        let lifetime = (caller.key.expires_at - now).min(self.settings.session_duration);
        let generated = ApiKey::generate(
            caller.subject.user_id,
            now + lifetime,
            lifetime.whole_seconds(),
            ApiKeyScope::ApplicationConnect,
        );
        if let Err(err) = self.api_keys.insert_api_key(generated.key).await {
            tracing::warn!(error = %err, "could not store application connect key");
            return ErrorPage::internal_error("Could not create an application API key.").render(headers);
        }
        let payload = EncryptedApiKeyPayload::new(generated.token, now);
        let encrypted = match encrypt_payload(self.encryption.as_ref(), &payload).await {
            Ok(encrypted) => encrypted,
            Err(err) => {
                tracing::warn!(error = %err, "could not encrypt application connect key");
                return ErrorPage::internal_error("Could not encrypt the application API key.").render(headers);
            }
        };

        let query = strip_query_params(redirect_uri.query().unwrap_or_default(), &[APP_CONNECT_API_KEY_QUERY_PARAMETER]);
        redirect_uri.set_query(if query.is_empty() { None } else { Some(&query) });
        redirect_uri.query_pairs_mut().append_pair(APP_CONNECT_API_KEY_QUERY_PARAMETER, &encrypted);
        Redirect::temporary(redirect_uri.as_str()).into_response()
    }

    /// Sends an anonymous caller to the dashboard login, returning here after.
    fn login_redirect(&self, parts: &Parts) -> Response {
        let mut location = self.settings.dashboard_url.clone();
        location.set_path(LOGIN_PATH);
        location.set_query(None);
        let target = with_query(parts.uri.path(), parts.uri.query().unwrap_or_default());
        location.query_pairs_mut().append_pair("redirect", &target);
        Redirect::to(location.as_str()).into_response()
    }

    /// Returns true when `uri` points at an app host this deployment trusts.
    fn allowed_target(&self, uri: &Url) -> bool {
        let Some(host) = uri.host_str() else {
            return false;
        };
        let patterns = self.settings.app_hostname.iter().chain(&self.settings.trusted_proxy_app_hostnames);
        for pattern in patterns {
            if let Some(subdomain) = pattern.match_host(host)
                && ApplicationUrl::parse_subdomain(&subdomain).is_ok()
            {
                return true;
            }
        }
        let authority = uri.port().map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
        self.settings
            .trusted_proxy_hosts
            .iter()
            .any(|trusted| trusted.eq_ignore_ascii_case(host) || trusted.eq_ignore_ascii_case(&authority))
    }
}

// ============================================================================
// SECTION: Redeemer
// ============================================================================

/// App host half of the handoff.
pub struct HandoffRedeemer {
    /// Encryption keys shared with the control plane.
    encryption: Arc<dyn EncryptionKeycache>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// App hostname, for the subdomain cookie domain.
    app_hostname: Option<HostnamePattern>,
    /// Add `Secure` to session cookies.
    secure: bool,
}

impl HandoffRedeemer {
    /// Creates a redeemer.
    #[must_use]
    pub fn new(
        encryption: Arc<dyn EncryptionKeycache>,
        clock: Arc<dyn Clock>,
        app_hostname: Option<HostnamePattern>,
        secure: bool,
    ) -> Self {
        Self {
            encryption,
            clock,
            app_hostname,
            secure,
        }
    }

    /// Redeems an encrypted key carried by the request, if there is one.
    ///
    /// Returns `None` when the request carries no key and should proceed.
    pub async fn redeem(&self, parts: &Parts, access_method: AccessMethod) -> Option<Response> {
        let encrypted = query_value(parts.uri.query(), APP_CONNECT_API_KEY_QUERY_PARAMETER)?;
        let expectations = ClaimExpectations::at(self.clock.now())
            .with_issuer(API_KEY_ISSUER)
            .with_audience(API_KEY_AUDIENCE);
        let payload = match decrypt_payload::<EncryptedApiKeyPayload>(self.encryption.as_ref(), &encrypted, &expectations)
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(error = %err, "could not decrypt handed-off api key");
                return Some(
                    ErrorPage::bad_request(
                        "Bad Request",
                        "Could not decrypt API key. Please remove the query parameter and try again.",
                    )
                    .render(&parts.headers),
                );
            }
        };

        let mut cookie =
            SetCookie::new(app_session_cookie(access_method), payload.api_key).path("/").secure(self.secure);
        if access_method == AccessMethod::Subdomain
            && let Some(domain) = self.app_hostname.as_ref().and_then(HostnamePattern::cookie_domain)
        {
            cookie = cookie.domain(domain);
        }
        let query = strip_query_params(parts.uri.query().unwrap_or_default(), &[APP_CONNECT_API_KEY_QUERY_PARAMETER]);
        let mut response = Redirect::to(&with_query(parts.uri.path(), &query)).into_response();
        if let Some(value) = cookie.header_value() {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Some(response)
    }
}
