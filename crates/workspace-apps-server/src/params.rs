// crates/workspace-apps-server/src/params.rs
// ============================================================================
// Module: Cookie and Query Parameters
// Description: Parse request cookies and queries; render Set-Cookie values.
// Purpose: Keep credential-carrying parameters in one audited place.
// Dependencies: axum, url, workspace-apps-core
// ============================================================================

//! ## Overview
//! Helpers for the cookies and query parameters that carry app credentials.
//! Query parameters listed in [`CREDENTIAL_QUERY_PARAMETERS`] must never be
//! echoed into a redirect; [`strip_query_params`] removes them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::header::COOKIE;
use time::Duration;
use url::form_urlencoded;
use workspace_apps_core::APP_CONNECT_API_KEY_QUERY_PARAMETER;
use workspace_apps_core::SIGNED_APP_TOKEN_QUERY_PARAMETER;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Query parameters that carry credentials.
pub const CREDENTIAL_QUERY_PARAMETERS: &[&str] =
    &[SIGNED_APP_TOKEN_QUERY_PARAMETER, APP_CONNECT_API_KEY_QUERY_PARAMETER];

// ============================================================================
// SECTION: Cookies
// ============================================================================

/// Iterates `(name, value)` pairs across every `Cookie` header, in order.
pub fn request_cookies(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> + '_ {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim(), value.trim()))
        })
}

/// Returns the first non-empty cookie named `name`.
#[must_use]
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    request_cookies(headers).find(|(key, value)| *key == name && !value.is_empty()).map(|(_, value)| value)
}

/// `Set-Cookie` builder. Cookies are always `HttpOnly` and `SameSite=Lax`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name.
    name: String,
    /// Cookie value.
    value: String,
    /// Path attribute.
    path: Option<String>,
    /// Domain attribute.
    domain: Option<String>,
    /// Max-Age attribute in seconds.
    max_age: Option<i64>,
    /// Whether to add `Secure`.
    secure: bool,
}

impl SetCookie {
    /// Starts a cookie with no scope attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            secure: false,
        }
    }

    /// Scopes the cookie to `path`.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Scopes the cookie to `domain` and its subdomains.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Expires the cookie after `lifetime`.
    #[must_use]
    pub fn max_age(mut self, lifetime: Duration) -> Self {
        self.max_age = Some(lifetime.whole_seconds().max(0));
        self
    }

    /// Marks the cookie `Secure`.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Renders the header value, or `None` when it holds invalid bytes.
    #[must_use]
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.to_string()).ok()
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        f.write_str("; HttpOnly; SameSite=Lax")?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Query Parameters
// ============================================================================

/// Returns every value of `name` in `query`, in order.
#[must_use]
pub fn query_values(query: Option<&str>, name: &str) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .collect()
}

/// Returns the first non-empty value of `name` in `query`.
#[must_use]
pub fn query_value(query: Option<&str>, name: &str) -> Option<String> {
    query_values(query, name).into_iter().find(|value| !value.is_empty())
}

/// Removes every parameter named in `names` from `query`.
///
/// The query is re-encoded only when something was removed.
#[must_use]
pub fn strip_query_params(query: &str, names: &[&str]) -> String {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if !pairs.iter().any(|(key, _)| names.contains(&key.as_str())) {
        return query.to_string();
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs.iter().filter(|(key, _)| !names.contains(&key.as_str())) {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Joins a path and an optional query into a request target.
#[must_use]
pub fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() { path.to_string() } else { format!("{path}?{query}") }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
