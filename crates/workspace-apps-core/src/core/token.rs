// crates/workspace-apps-core/src/core/token.rs
// ============================================================================
// Module: App Tokens
// Description: Signed app token claims and the encrypted API key envelope.
// Purpose: Define what is minted, what is matched, and the names it travels under.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`SignedToken`] records one positive authorization decision: the
//! normalized request plus the resolved owner, workspace, agent, and upstream
//! URL. It is only valid for requests that [`SignedToken::matches_request`].
//! An [`EncryptedApiKeyPayload`] carries an API key across the boundary
//! between the control plane and an app or proxy host.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::Duration;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::WorkspaceId;
use crate::core::request::Request;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Cookie carrying the signed app token, scoped to the app base path.
pub const SIGNED_APP_TOKEN_COOKIE: &str = "coder_signed_app_token";
/// Query parameter carrying a signed token (terminal requests only).
pub const SIGNED_APP_TOKEN_QUERY_PARAMETER: &str = "coder_signed_app_token_23db1dde";
/// Query parameter carrying an encrypted API key during the login handoff.
pub const APP_CONNECT_API_KEY_QUERY_PARAMETER: &str = "coder_application_connect_api_key_35e783";
/// Dashboard session cookie.
pub const SESSION_TOKEN_COOKIE: &str = "coder_session_token";
/// Session token header.
pub const SESSION_TOKEN_HEADER: &str = "Coder-Session-Token";
/// Session cookie set on path-app proxy hosts after a handoff.
pub const PATH_APP_SESSION_TOKEN_COOKIE: &str = "coder_path_app_session_token";
/// Session cookie set on the wildcard app domain after a handoff.
pub const SUBDOMAIN_APP_SESSION_TOKEN_COOKIE: &str = "coder_subdomain_app_session_token";
/// Query parameter naming the post-login destination.
pub const REDIRECT_URI_QUERY_PARAMETER: &str = "redirect_uri";
/// Header a proxy authenticates to the control plane with.
pub const PROXY_TOKEN_HEADER: &str = "Coder-External-Proxy-Token";
/// Issuer of encrypted API key payloads.
pub const API_KEY_ISSUER: &str = "coderd";
/// Audience of encrypted API key payloads.
pub const API_KEY_AUDIENCE: &str = "wsproxy";
/// Default signed token lifetime.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::minutes(1);
/// Lifetime of an encrypted API key payload.
pub const API_KEY_PAYLOAD_LIFETIME: Duration = Duration::minutes(1);
/// Maximum number of token candidates inspected per request.
pub const MAX_TOKEN_CANDIDATES: usize = 4;

// ============================================================================
// SECTION: Registered Claims
// ============================================================================

/// Registered JWT claims (times in Unix seconds).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Not before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

/// Access to the registered claims of a token body.
pub trait Claims {
    /// Returns the registered claims.
    fn registered(&self) -> &RegisteredClaims;
}

// ============================================================================
// SECTION: Signed Token
// ============================================================================

/// Signed credential for one app on one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedToken {
    /// Registered claims.
    #[serde(flatten)]
    pub claims: RegisteredClaims,
    /// Normalized request the token was issued for.
    pub request: Request,
    /// Workspace owner.
    pub user_id: UserId,
    /// Workspace.
    pub workspace_id: WorkspaceId,
    /// Agent serving the app.
    pub agent_id: AgentId,
    /// Upstream URL (empty for terminals).
    #[serde(default)]
    pub app_url: String,
}

impl SignedToken {
    /// Returns true when the token was issued for the same app as `req`.
    ///
    /// Base paths compare equal with or without a trailing `/`. The caller
    /// passes a normalized request.
    #[must_use]
    pub fn matches_request(&self, req: &Request) -> bool {
        let token = &self.request;
        token.access_method == req.access_method
            && with_trailing_slash(&token.base_path) == with_trailing_slash(&req.base_path)
            && token.prefix == req.prefix
            && token.username_or_id == req.username_or_id
            && token.workspace_name_or_id == req.workspace_name_or_id
            && token.agent_name_or_id == req.agent_name_or_id
            && token.app_slug_or_port == req.app_slug_or_port
    }

    /// Returns the expiry as a timestamp, when set.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.claims.exp.and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
    }
}

impl Claims for SignedToken {
    fn registered(&self) -> &RegisteredClaims {
        &self.claims
    }
}

/// Appends `/` unless already present.
fn with_trailing_slash(path: &str) -> std::borrow::Cow<'_, str> {
    if path.ends_with('/') {
        std::borrow::Cow::Borrowed(path)
    } else {
        std::borrow::Cow::Owned(format!("{path}/"))
    }
}

// ============================================================================
// SECTION: Encrypted API Key Payload
// ============================================================================

/// API key smuggled from the control plane to an app host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedApiKeyPayload {
    /// Registered claims.
    #[serde(flatten)]
    pub claims: RegisteredClaims,
    /// Session token of the minted application-connect key.
    pub api_key: String,
}

impl EncryptedApiKeyPayload {
    /// Wraps an API key with issuer, audience, and a one minute window.
    ///
    /// `nbf` is backdated one minute to tolerate clock skew between hosts.
    #[must_use]
    pub fn new(api_key: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            claims: RegisteredClaims {
                iss: Some(API_KEY_ISSUER.to_string()),
                aud: Some(API_KEY_AUDIENCE.to_string()),
                exp: Some((now + API_KEY_PAYLOAD_LIFETIME).unix_timestamp()),
                nbf: Some((now - API_KEY_PAYLOAD_LIFETIME).unix_timestamp()),
            },
            api_key: api_key.into(),
        }
    }
}

impl Claims for EncryptedApiKeyPayload {
    fn registered(&self) -> &RegisteredClaims {
        &self.claims
    }
}
