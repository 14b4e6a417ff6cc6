// crates/workspace-apps-server/src/provider.rs
// ============================================================================
// Module: Signed Token Provider
// Description: Shared contract for direct and delegating token authorities.
// Purpose: Find a reusable signed token on a request or issue a fresh one.
// Dependencies: axum, async-trait, tracing, workspace-apps-core
// ============================================================================

//! ## Overview
//! A [`SignedTokenProvider`] answers two questions for an app request: does
//! the request already carry a valid token (`from_request`), and if not, can
//! one be issued (`issue`). Issuance either yields a token or a complete HTTP
//! response (error page or redirect) that must be returned unchanged.
//!
//! Candidate tokens are the terminal query parameter followed by every
//! signed token cookie, capped at [`MAX_TOKEN_CANDIDATES`]. The first
//! candidate that verifies and whose request passes `check` wins; invalid
//! candidates are skipped, so an expired cookie silently leads to a fresh
//! issue.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use axum::http::HeaderValue;
use axum::http::request::Parts;
use axum::response::Response;
use time::Duration;
use time::OffsetDateTime;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::ClaimExpectations;
use workspace_apps_core::IssueTokenRequest;
use workspace_apps_core::MAX_TOKEN_CANDIDATES;
use workspace_apps_core::SIGNED_APP_TOKEN_COOKIE;
use workspace_apps_core::SIGNED_APP_TOKEN_QUERY_PARAMETER;
use workspace_apps_core::SignedToken;
use workspace_apps_core::SigningKeycache;
use workspace_apps_core::verify_token;

use crate::pages::ErrorPage;
use crate::params::SetCookie;
use crate::params::query_values;
use crate::params::request_cookies;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Freshly issued token and its compact serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Decoded token.
    pub token: SignedToken,
    /// Compact form to hand to the caller.
    pub serialized: String,
}

/// Provider of signed app tokens.
#[async_trait]
pub trait SignedTokenProvider: Send + Sync {
    /// Returns the first valid token the request carries, if any.
    async fn from_request(&self, parts: &Parts) -> Option<SignedToken>;

    /// Issues a token for `request`.
    ///
    /// # Errors
    ///
    /// Returns the response to send to the caller when no token can be
    /// issued.
    async fn issue(&self, parts: &Parts, request: IssueTokenRequest) -> Result<IssuedToken, Response>;
}

/// Scope of the signed token cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCookieSettings {
    /// Add `Secure` to the cookie.
    pub secure: bool,
    /// Cookie `Max-Age`.
    pub token_lifetime: Duration,
}

/// Token ready for forwarding, plus the cookie to set when it was issued.
#[derive(Debug, Clone)]
pub struct ResolvedToken {
    /// Token authorizing the request.
    pub token: SignedToken,
    /// `Set-Cookie` value for a newly issued token.
    pub set_cookie: Option<HeaderValue>,
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Token candidate and where it came from.
struct Candidate {
    /// Compact token.
    value: String,
    /// Whether it came from the query string.
    from_query: bool,
}

/// Collects candidate tokens in evaluation order.
fn candidates(parts: &Parts) -> Vec<Candidate> {
    let from_query = query_values(parts.uri.query(), SIGNED_APP_TOKEN_QUERY_PARAMETER)
        .into_iter()
        .map(|value| Candidate {
            value,
            from_query: true,
        });
    let from_cookies = request_cookies(&parts.headers)
        .filter(|(name, _)| *name == SIGNED_APP_TOKEN_COOKIE)
        .map(|(_, value)| Candidate {
            value: value.to_string(),
            from_query: false,
        });
    from_query
        .chain(from_cookies)
        .filter(|candidate| !candidate.value.is_empty())
        .take(MAX_TOKEN_CANDIDATES)
        .collect()
}

/// Returns the first candidate on `parts` that verifies at `now`.
///
/// Query candidates only count when the token is for a terminal.
pub async fn token_from_request(
    keycache: &dyn SigningKeycache,
    now: OffsetDateTime,
    parts: &Parts,
) -> Option<SignedToken> {
    let expectations = ClaimExpectations::at(now);
    for candidate in candidates(parts) {
        let mut token = match verify_token::<SignedToken>(keycache, &candidate.value, &expectations).await {
            Ok(token) => token,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring invalid signed app token");
                continue;
            }
        };
        token.request = token.request.normalize();
        if candidate.from_query && token.request.access_method != AccessMethod::Terminal {
            continue;
        }
        if token.request.check().is_ok() {
            return Some(token);
        }
    }
    None
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Reuses a matching token from the request or issues a new one.
///
/// # Errors
///
/// Returns the response to send when the request is malformed or issuance
/// fails.
pub async fn resolve_request(
    provider: &dyn SignedTokenProvider,
    parts: &Parts,
    issue: IssueTokenRequest,
    cookie: TokenCookieSettings,
) -> Result<ResolvedToken, Response> {
    let app_request = issue.app_request.normalize();
    if let Err(err) = app_request.check() {
        tracing::warn!(
            error = %err,
            access_method = %app_request.access_method,
            base_path = %app_request.base_path,
            "invalid app request"
        );
        return Err(ErrorPage::internal_error(format!("Invalid app request: {err}")).render(&parts.headers));
    }

    if let Some(token) = provider.from_request(parts).await
        && token.matches_request(&app_request)
    {
        return Ok(ResolvedToken {
            token,
            set_cookie: None,
        });
    }

    let base_path = app_request.base_path.clone();
    let issued = provider
        .issue(
            parts,
            IssueTokenRequest {
                app_request,
                ..issue
            },
        )
        .await?;
    let set_cookie = SetCookie::new(SIGNED_APP_TOKEN_COOKIE, issued.serialized)
        .path(base_path)
        .max_age(cookie.token_lifetime)
        .secure(cookie.secure)
        .header_value();
    Ok(ResolvedToken {
        token: issued.token,
        set_cookie,
    })
}
