// crates/workspace-apps-core/src/core/request.rs
// ============================================================================
// Module: Workspace App Requests
// Description: Canonical app addressing request and the issuance envelope.
// Purpose: Normalize and check caller intent before lookup, signing, or match.
// Dependencies: serde, url, uuid
// ============================================================================

//! ## Overview
//! A [`Request`] captures how the caller addressed an app: by path on the
//! dashboard host, by wildcard subdomain, or as an agent terminal. Requests
//! must be normalized with [`Request::normalize`] before they are checked,
//! compared against a token, or embedded in one.
//!
//! Security posture: all fields come straight from URLs and headers; nothing
//! here is trusted until [`Request::check`] passes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::core::appurl::ApplicationUrl;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reserved username alias that is never valid inside an app request.
pub const ME_ALIAS: &str = "me";
/// Required suffix of a subdomain routing prefix.
pub const PREFIX_SUFFIX: &str = "---";

// ============================================================================
// SECTION: Access Method
// ============================================================================

/// How the caller addressed the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
    /// `/@user/workspace.agent/apps/slug/` on a dashboard or proxy host.
    Path,
    /// `slug--agent--workspace--user.apps.example.com`.
    Subdomain,
    /// Agent terminal endpoint addressed by agent UUID.
    Terminal,
}

impl AccessMethod {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Subdomain => "subdomain",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Request
// ============================================================================

/// Caller addressing intent for a workspace application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Addressing style.
    pub access_method: AccessMethod,
    /// Cookie scope path for the app, e.g. `/@user/ws/apps/code/`.
    pub base_path: String,
    /// Subdomain routing prefix ending in `---` (subdomain access only).
    #[serde(rename = "app_prefix", default)]
    pub prefix: String,
    /// Workspace owner username or user UUID.
    #[serde(default)]
    pub username_or_id: String,
    /// Combined `workspace` or `workspace.agent` path segment, split during
    /// normalization. Never serialized.
    #[serde(skip)]
    pub workspace_and_agent: String,
    /// Workspace name or UUID.
    #[serde(default)]
    pub workspace_name_or_id: String,
    /// Agent name or UUID; optional when the workspace has a single agent.
    #[serde(default)]
    pub agent_name_or_id: String,
    /// App slug, or a port number (optionally suffixed with `s` for https).
    #[serde(default)]
    pub app_slug_or_port: String,
}

impl Request {
    /// Builds a path-app request from the raw URL segments.
    #[must_use]
    pub fn path_app(
        base_path: impl Into<String>,
        username_or_id: impl Into<String>,
        workspace_and_agent: impl Into<String>,
        app_slug_or_port: impl Into<String>,
    ) -> Self {
        Self {
            access_method: AccessMethod::Path,
            base_path: base_path.into(),
            prefix: String::new(),
            username_or_id: username_or_id.into(),
            workspace_and_agent: workspace_and_agent.into(),
            workspace_name_or_id: String::new(),
            agent_name_or_id: String::new(),
            app_slug_or_port: app_slug_or_port.into(),
        }
    }

    /// Builds a subdomain-app request from a parsed application hostname.
    #[must_use]
    pub fn subdomain_app(app: &ApplicationUrl) -> Self {
        Self {
            access_method: AccessMethod::Subdomain,
            base_path: "/".to_string(),
            prefix: app.prefix.clone(),
            username_or_id: app.username.clone(),
            workspace_and_agent: String::new(),
            workspace_name_or_id: app.workspace_name.clone(),
            agent_name_or_id: app.agent_name.clone(),
            app_slug_or_port: app.app_slug_or_port.clone(),
        }
    }

    /// Builds a terminal request for the agent with the given UUID string.
    #[must_use]
    pub fn terminal(base_path: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            access_method: AccessMethod::Terminal,
            base_path: base_path.into(),
            prefix: String::new(),
            username_or_id: String::new(),
            workspace_and_agent: String::new(),
            workspace_name_or_id: String::new(),
            agent_name_or_id: agent_id.into(),
            app_slug_or_port: String::new(),
        }
    }

    /// Returns the canonical form of this request.
    ///
    /// Splits `workspace_and_agent` on its first `.` into the workspace and
    /// agent fields and guarantees a trailing `/` on the base path. Applying
    /// it twice yields the same value.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let mut req = self.clone();
        if !req.workspace_and_agent.is_empty() {
            let combined = std::mem::take(&mut req.workspace_and_agent);
            match combined.split_once('.') {
                Some((workspace, agent)) => {
                    req.workspace_name_or_id = workspace.to_string();
                    req.agent_name_or_id = agent.to_string();
                }
                None => req.workspace_name_or_id = combined,
            }
        }
        if !req.base_path.ends_with('/') {
            req.base_path.push('/');
        }
        req
    }

    /// Validates field presence and combinations for the access method.
    ///
    /// Only normalized requests pass: a populated `workspace_and_agent` is
    /// rejected outright.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Invalid`] describing the first violation.
    pub fn check(&self) -> Result<(), RequestError> {
        if self.base_path.is_empty() {
            return Err(invalid("base path is required"));
        }
        if !self.prefix.is_empty() {
            if self.access_method != AccessMethod::Subdomain {
                return Err(invalid("prefix is only valid for subdomain access"));
            }
            if !self.prefix.ends_with(PREFIX_SUFFIX) {
                return Err(invalid("prefix must end with '---'"));
            }
        }
        if self.access_method == AccessMethod::Terminal {
            return self.check_terminal();
        }
        if self.username_or_id.is_empty() {
            return Err(invalid("username or ID is required"));
        }
        if self.username_or_id == ME_ALIAS {
            return Err(invalid(format!("username or ID cannot be \"{ME_ALIAS}\"")));
        }
        if !self.workspace_and_agent.is_empty() {
            return Err(invalid("workspace_and_agent is set; normalize the request first"));
        }
        if self.workspace_name_or_id.is_empty() {
            return Err(invalid("workspace name or ID is required"));
        }
        if self.app_slug_or_port.is_empty() {
            return Err(invalid("app slug or port is required"));
        }
        Ok(())
    }

    /// Terminal requests only carry the base path and an agent UUID.
    fn check_terminal(&self) -> Result<(), RequestError> {
        if !self.username_or_id.is_empty()
            || !self.workspace_and_agent.is_empty()
            || !self.workspace_name_or_id.is_empty()
            || !self.app_slug_or_port.is_empty()
        {
            return Err(invalid(
                "terminal access only accepts base path and agent name or ID",
            ));
        }
        if self.agent_name_or_id.is_empty() {
            return Err(invalid("agent name or ID is required"));
        }
        Uuid::parse_str(&self.agent_name_or_id).map_err(|err| {
            invalid(format!(
                "invalid agent name or ID \"{}\", must be a UUID: {err}",
                self.agent_name_or_id
            ))
        })?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Issue Token Request
// ============================================================================

/// Envelope sent to a token issuer (directly or across the proxy boundary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTokenRequest {
    /// App addressing request.
    pub app_request: Request,
    /// Base URL of the host serving path apps (dashboard or proxy).
    pub path_app_base_url: String,
    /// Wildcard app hostname pattern, e.g. `*.apps.example.com`.
    #[serde(default)]
    pub app_hostname: String,
    /// Path inside the app the caller was visiting.
    #[serde(default)]
    pub app_path: String,
    /// Raw query string the caller sent to the app.
    #[serde(default)]
    pub app_query: String,
    /// Session token presented by the caller, if any.
    #[serde(default)]
    pub session_token: String,
}

impl IssueTokenRequest {
    /// Returns the base URL of the app being accessed.
    ///
    /// Path and terminal apps live under the path app base URL at the
    /// request base path; subdomain apps get their rendered hostname spliced
    /// into the wildcard app hostname.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the base URL is unparsable or a
    /// subdomain app has no app hostname configured.
    pub fn app_base_url(&self) -> Result<Url, RequestError> {
        let mut base = Url::parse(&self.path_app_base_url)
            .map_err(|err| RequestError::Url(format!("path app base url: {err}")))?;
        match self.app_request.access_method {
            AccessMethod::Path | AccessMethod::Terminal => {
                let mut path = self.app_request.base_path.clone();
                if !path.ends_with('/') {
                    path.push('/');
                }
                base.set_path(&path);
                base.set_query(None);
                Ok(base)
            }
            AccessMethod::Subdomain => {
                if self.app_hostname.is_empty() {
                    return Err(RequestError::MissingAppHostname);
                }
                let app = ApplicationUrl {
                    prefix: self.app_request.prefix.clone(),
                    app_slug_or_port: self.app_request.app_slug_or_port.clone(),
                    agent_name: self.app_request.agent_name_or_id.clone(),
                    workspace_name: self.app_request.workspace_name_or_id.clone(),
                    username: self.app_request.username_or_id.clone(),
                };
                let host = self.app_hostname.replacen('*', &app.to_string(), 1);
                Url::parse(&format!("{}://{host}/", base.scheme()))
                    .map_err(|err| RequestError::Url(format!("app hostname: {err}")))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Request validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Field presence or combination violation.
    #[error("invalid app request: {0}")]
    Invalid(String),
    /// Subdomain app without an app hostname.
    #[error("app hostname is required for subdomain apps")]
    MissingAppHostname,
    /// URL construction failure.
    #[error("invalid url: {0}")]
    Url(String),
}

/// Shorthand for [`RequestError::Invalid`].
fn invalid(message: impl Into<String>) -> RequestError {
    RequestError::Invalid(message.into())
}
