// crates/workspace-apps-server/src/pages.rs
// ============================================================================
// Module: Error Pages
// Description: Caller-facing error responses in HTML or JSON.
// Purpose: Render every terminal failure of an app request the same way.
// Dependencies: axum, serde
// ============================================================================

//! ## Overview
//! An [`ErrorPage`] is rendered as a small HTML document by default and as a
//! JSON object (`{"message","detail"}`) when the caller's `Accept` header
//! asks for `application/json`. Titles and details are escaped; warnings from
//! the authorizer are operator guidance and are safe to show.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::ACCEPT;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Error page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    /// Response status.
    pub status: StatusCode,
    /// Short title.
    pub title: String,
    /// Longer explanation.
    pub detail: String,
    /// Authorizer warnings.
    pub warnings: Vec<String>,
}

/// JSON rendering of an [`ErrorPage`].
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    /// Page title.
    message: &'a str,
    /// Page detail.
    detail: &'a str,
    /// Warnings, omitted when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: &'a Vec<String>,
}

impl ErrorPage {
    /// Creates a page with no warnings.
    #[must_use]
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            detail: detail.into(),
            warnings: Vec::new(),
        }
    }

    /// 404 for apps that do not exist or that the caller may not see.
    #[must_use]
    pub fn not_found(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            ..Self::new(
                StatusCode::NOT_FOUND,
                "Application Not Found",
                "The application or workspace you are trying to access does not exist or you \
                 do not have permission to access it.",
            )
        }
    }

    /// 400 for a workspace whose latest build stopped it.
    #[must_use]
    pub fn workspace_offline() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Workspace Offline",
            "The workspace is not running. Start the workspace and try again.",
        )
    }

    /// 400 with a custom title.
    #[must_use]
    pub fn bad_request(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, title, detail)
    }

    /// 500 for malformed requests and infrastructure failures.
    #[must_use]
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", detail)
    }

    /// 502 for an app whose agent cannot serve it.
    #[must_use]
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "Application Unavailable", detail)
    }

    /// Renders the page for a caller whose request carried `headers`.
    #[must_use]
    pub fn render(&self, headers: &HeaderMap) -> Response {
        if wants_json(headers) {
            let body = ErrorBody {
                message: &self.title,
                detail: &self.detail,
                warnings: &self.warnings,
            };
            return (self.status, Json(body)).into_response();
        }
        (self.status, Html(self.html())).into_response()
    }

    /// Builds the HTML document.
    fn html(&self) -> String {
        let mut warnings = String::new();
        if !self.warnings.is_empty() {
            warnings.push_str("<h3>Warnings</h3><ul>");
            for warning in &self.warnings {
                warnings.push_str("<li>");
                warnings.push_str(&escape_html(warning));
                warnings.push_str("</li>");
            }
            warnings.push_str("</ul>");
        }
        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
             <body><h1>{status} - {title}</h1><p>{detail}</p>{warnings}</body></html>",
            status = self.status.as_u16(),
            title = escape_html(&self.title),
            detail = escape_html(&self.detail),
        )
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when `Accept` names `application/json`.
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("application/json"))
}

/// Escapes text for HTML element content and attribute values.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
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

    use super::*;

    #[test]
    fn html_escapes_untrusted_text() {
        let page = ErrorPage::not_found(vec!["<script>".to_string()]);
        let html = page.html();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("404 - Application Not Found"));
    }

    #[test]
    fn json_is_selected_by_accept() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html, application/json;q=0.9"));
        assert!(wants_json(&headers));
        let response = ErrorPage::workspace_offline().render(&headers);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
