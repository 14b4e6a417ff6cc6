// crates/workspace-apps-core/src/core/appurl.rs
// ============================================================================
// Module: Application URLs
// Description: Subdomain application hostnames and wildcard host patterns.
// Purpose: Render and parse `app--agent--workspace--user` subdomains.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Subdomain apps are addressed as `{prefix}{app}--{agent}--{workspace}--{user}`
//! under a wildcard app hostname such as `*.apps.example.com`. Each name is
//! alphanumeric runs joined by single hyphens, which keeps `--` and `---`
//! unambiguous as separators.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

use crate::core::request::PREFIX_SUFFIX;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Separator between application hostname segments.
const SEGMENT_SEPARATOR: &str = "--";
/// Lowest port that may be addressed as a port app.
pub const MINIMUM_APP_PORT: u16 = 9;

// ============================================================================
// SECTION: Application URL
// ============================================================================

/// Parsed subdomain application hostname.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplicationUrl {
    /// Routing prefix including its trailing `---`, or empty.
    pub prefix: String,
    /// App slug or port.
    pub app_slug_or_port: String,
    /// Agent name, or empty when omitted.
    pub agent_name: String,
    /// Workspace name.
    pub workspace_name: String,
    /// Owner username.
    pub username: String,
}

impl ApplicationUrl {
    /// Parses the subdomain label of an application hostname.
    ///
    /// # Errors
    ///
    /// Returns [`AppUrlError::InvalidSubdomain`] when the label does not
    /// match the application URL grammar.
    pub fn parse_subdomain(subdomain: &str) -> Result<Self, AppUrlError> {
        let (prefix, remainder) = match subdomain.rfind(PREFIX_SUFFIX) {
            Some(index) => {
                let split = index + PREFIX_SUFFIX.len();
                (&subdomain[..split], &subdomain[split..])
            }
            None => ("", subdomain),
        };
        let segments: Vec<&str> = remainder.split(SEGMENT_SEPARATOR).collect();
        if !segments.iter().all(|segment| is_valid_name(segment)) {
            return Err(AppUrlError::InvalidSubdomain(subdomain.to_string()));
        }
        let (app, agent, workspace, user) = match segments.as_slice() {
            [app, workspace, user] => (*app, "", *workspace, *user),
            [app, agent, workspace, user] => (*app, *agent, *workspace, *user),
            _ => return Err(AppUrlError::InvalidSubdomain(subdomain.to_string())),
        };
        Ok(Self {
            prefix: prefix.to_string(),
            app_slug_or_port: app.to_string(),
            agent_name: agent.to_string(),
            workspace_name: workspace.to_string(),
            username: user.to_string(),
        })
    }
}

impl fmt::Display for ApplicationUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.app_slug_or_port)?;
        if !self.agent_name.is_empty() {
            write!(f, "{SEGMENT_SEPARATOR}{}", self.agent_name)?;
        }
        write!(f, "{SEGMENT_SEPARATOR}{}{SEGMENT_SEPARATOR}{}", self.workspace_name, self.username)
    }
}

/// Returns true for alphanumeric runs joined by single hyphens.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('-').all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric()))
}

// ============================================================================
// SECTION: Hostname Pattern
// ============================================================================

/// Wildcard app hostname such as `*.apps.example.com` or `*--apps.example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnamePattern {
    /// Lowercased text following the leading `*`.
    suffix: String,
}

impl HostnamePattern {
    /// Compiles a wildcard hostname pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AppUrlError::InvalidPattern`] when the pattern is not a
    /// single leading `*` followed by `.` or `-` and a hostname without port.
    pub fn parse(pattern: &str) -> Result<Self, AppUrlError> {
        let lowered = pattern.trim().to_ascii_lowercase();
        let Some(suffix) = lowered.strip_prefix('*') else {
            return Err(AppUrlError::InvalidPattern(format!("{pattern} must start with '*'")));
        };
        if suffix.contains('*') {
            return Err(AppUrlError::InvalidPattern(format!(
                "{pattern} must contain exactly one '*'"
            )));
        }
        if !(suffix.starts_with('.') || suffix.starts_with('-')) || suffix.len() < 2 {
            return Err(AppUrlError::InvalidPattern(format!(
                "{pattern} must have '.' or '-' and a hostname after '*'"
            )));
        }
        if suffix.contains(':') || suffix.contains('/') {
            return Err(AppUrlError::InvalidPattern(format!(
                "{pattern} must not contain a port or path"
            )));
        }
        Ok(Self {
            suffix: suffix.to_string(),
        })
    }

    /// Returns the subdomain label when `host` matches the pattern.
    ///
    /// Ports are ignored and matching is case-insensitive. The captured label
    /// must be non-empty and must not contain a `.`.
    #[must_use]
    pub fn match_host(&self, host: &str) -> Option<String> {
        let hostname = strip_port(host).to_ascii_lowercase();
        let subdomain = hostname.strip_suffix(self.suffix.as_str())?;
        if subdomain.is_empty() || subdomain.contains('.') {
            return None;
        }
        Some(subdomain.to_string())
    }

    /// Renders a full hostname for the given subdomain label.
    #[must_use]
    pub fn render(&self, subdomain: &str) -> String {
        format!("{subdomain}{}", self.suffix)
    }

    /// Returns the shared cookie domain for the pattern, when it has one.
    ///
    /// `*.apps.example.com` shares `.apps.example.com`; dash-joined patterns
    /// have no common parent domain.
    #[must_use]
    pub fn cookie_domain(&self) -> Option<&str> {
        self.suffix.starts_with('.').then_some(self.suffix.as_str())
    }
}

impl fmt::Display for HostnamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*{}", self.suffix)
    }
}

/// Strips an optional `:port` from a host header value.
#[must_use]
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map_or(host, |(inner, _)| inner);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

// ============================================================================
// SECTION: Port Apps
// ============================================================================

/// Scheme used to reach a port app inside the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortProtocol {
    /// Plain HTTP.
    Http,
    /// HTTPS (slug carried an `s` suffix).
    Https,
}

impl PortProtocol {
    /// Returns the URL scheme.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Parses an app slug that addresses a listening port (`8080`, `8443s`).
///
/// Returns `None` for regular slugs and for ports below [`MINIMUM_APP_PORT`].
#[must_use]
pub fn parse_port_slug(slug: &str) -> Option<(u16, PortProtocol)> {
    let (digits, protocol) = match slug.strip_suffix('s') {
        Some(digits) => (digits, PortProtocol::Https),
        None => (slug, PortProtocol::Http),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port: u16 = digits.parse().ok()?;
    (port >= MINIMUM_APP_PORT).then_some((port, protocol))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Application URL errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppUrlError {
    /// Subdomain label is not an application URL.
    #[error("invalid application url format: {0}")]
    InvalidSubdomain(String),
    /// Wildcard hostname pattern is malformed.
    #[error("invalid hostname pattern: {0}")]
    InvalidPattern(String),
}
