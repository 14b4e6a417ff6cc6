// crates/workspace-apps-server/src/apikey.rs
// ============================================================================
// Module: API Key Authentication
// Description: Extract session tokens from requests and resolve them to users.
// Purpose: Optional caller authentication for app requests and the handoff.
// Dependencies: axum, thiserror, workspace-apps-core
// ============================================================================

//! ## Overview
//! App requests authenticate optionally: an unknown, malformed, or expired
//! session token makes the caller anonymous rather than failing the request.
//! Only a store failure is an error.
//!
//! Session tokens are looked up in this order:
//! 1. the `Coder-Session-Token` header,
//! 2. the app session cookie for the access method (path apps and terminals
//!    use the path cookie, subdomain apps the subdomain cookie),
//! 3. the dashboard `coder_session_token` cookie,
//! 4. an `Authorization: Bearer` header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use thiserror::Error;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::ApiKey;
use workspace_apps_core::ApiKeyStore;
use workspace_apps_core::AppStore;
use workspace_apps_core::Clock;
use workspace_apps_core::PATH_APP_SESSION_TOKEN_COOKIE;
use workspace_apps_core::SESSION_TOKEN_COOKIE;
use workspace_apps_core::SESSION_TOKEN_HEADER;
use workspace_apps_core::SUBDOMAIN_APP_SESSION_TOKEN_COOKIE;
use workspace_apps_core::StoreError;
use workspace_apps_core::Subject;

use crate::params::cookie_value;

// ============================================================================
// SECTION: Token Extraction
// ============================================================================

/// Returns the app session cookie name for an access method.
#[must_use]
pub const fn app_session_cookie(access_method: AccessMethod) -> &'static str {
    match access_method {
        AccessMethod::Subdomain => SUBDOMAIN_APP_SESSION_TOKEN_COOKIE,
        AccessMethod::Path | AccessMethod::Terminal => PATH_APP_SESSION_TOKEN_COOKIE,
    }
}

/// Finds the session token an app request carries.
#[must_use]
pub fn app_session_token(headers: &HeaderMap, access_method: AccessMethod) -> Option<String> {
    header_token(headers)
        .or_else(|| cookie_value(headers, app_session_cookie(access_method)).map(str::to_string))
        .or_else(|| cookie_value(headers, SESSION_TOKEN_COOKIE).map(str::to_string))
        .or_else(|| bearer_token(headers))
}

/// Finds the dashboard session token (no app cookies).
#[must_use]
pub fn dashboard_session_token(headers: &HeaderMap) -> Option<String> {
    header_token(headers)
        .or_else(|| cookie_value(headers, SESSION_TOKEN_COOKIE).map(str::to_string))
        .or_else(|| bearer_token(headers))
}

/// Reads the `Coder-Session-Token` header.
fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Reads an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}

// ============================================================================
// SECTION: Authenticator
// ============================================================================

/// Authenticated caller plus the key it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    /// Caller as seen by the authorizer.
    pub subject: Subject,
    /// Key record.
    pub key: ApiKey,
}

/// Authentication errors. Invalid credentials are not errors.
#[derive(Debug, Error)]
pub enum ApiKeyError {
    /// Backing store failed.
    #[error("api key store error: {0}")]
    Store(#[from] StoreError),
}

/// Resolves session tokens into subjects.
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    /// API key records.
    keys: Arc<dyn ApiKeyStore>,
    /// User records.
    users: Arc<dyn AppStore>,
    /// Time source for expiry checks.
    clock: Arc<dyn Clock>,
}

impl ApiKeyAuthenticator {
    /// Creates an authenticator.
    #[must_use]
    pub fn new(keys: Arc<dyn ApiKeyStore>, users: Arc<dyn AppStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            users,
            clock,
        }
    }

    /// Resolves `token` into a subject, or `None` when it is not valid.
    ///
    /// # Errors
    ///
    /// Returns [`ApiKeyError::Store`] when a lookup fails.
    pub async fn authenticate(&self, token: &str) -> Result<Option<Authenticated>, ApiKeyError> {
        let Some((id, secret)) = ApiKey::split_token(token) else {
            return Ok(None);
        };
        let Some(key) = self.keys.api_key_by_id(&id).await? else {
            return Ok(None);
        };
        if !key.secret_matches(secret) || key.is_expired(self.clock.now()) {
            return Ok(None);
        }
        let Some(user) = self.users.user_by_id(key.user_id).await? else {
            return Ok(None);
        };
        Ok(Some(Authenticated {
            subject: Subject {
                user_id: user.id,
                roles: user.roles,
                scope: key.scope,
            },
            key,
        }))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;

    use super::*;

    #[test]
    fn header_wins_over_cookies_and_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer bearer-token"));
        assert_eq!(app_session_token(&headers, AccessMethod::Path).as_deref(), Some("bearer-token"));

        headers.insert(COOKIE, HeaderValue::from_static("coder_session_token=dash"));
        assert_eq!(app_session_token(&headers, AccessMethod::Path).as_deref(), Some("dash"));

        headers.insert(
            COOKIE,
            HeaderValue::from_static("coder_session_token=dash; coder_subdomain_app_session_token=sub"),
        );
        assert_eq!(app_session_token(&headers, AccessMethod::Subdomain).as_deref(), Some("sub"));
        assert_eq!(app_session_token(&headers, AccessMethod::Path).as_deref(), Some("dash"));

        headers.insert("coder-session-token", HeaderValue::from_static("header"));
        assert_eq!(app_session_token(&headers, AccessMethod::Subdomain).as_deref(), Some("header"));
    }

    #[test]
    fn dashboard_token_ignores_app_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("coder_path_app_session_token=app"));
        assert_eq!(dashboard_session_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(dashboard_session_token(&headers), None);
    }
}
