// crates/workspace-apps-server/src/client.rs
// ============================================================================
// Module: Primary Client
// Description: HTTP client a proxy uses to reach the control plane.
// Purpose: Delegate token issuance and ship app stats across the boundary.
// Dependencies: reqwest, serde, thiserror, workspace-apps-core
// ============================================================================

//! ## Overview
//! A proxy host holds no platform records. It asks the control plane to
//! issue tokens and accepts whatever the control plane answers: a 201 with
//! a signed token, or any other response which is relayed to the caller
//! unchanged (status, headers, body). Every call is authenticated with the
//! proxy token header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::CONNECTION;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::header::TRANSFER_ENCODING;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;
use workspace_apps_core::IssueTokenRequest;
use workspace_apps_core::PROXY_TOKEN_HEADER;
use workspace_apps_core::StatsReport;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Control plane endpoint that issues tokens for proxies.
pub const ISSUE_SIGNED_APP_TOKEN_PATH: &str = "/api/v2/workspaceproxies/me/issue-signed-app-token";
/// Control plane endpoint that accepts proxy app stats.
pub const APP_STATS_PATH: &str = "/api/v2/workspaceproxies/me/app-stats";

/// Successful issuance body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSignedAppTokenResponse {
    /// Compact signed token.
    pub signed_token_str: String,
}

/// App stats upload body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAppStatsRequest {
    /// Reports to persist.
    pub stats: Vec<StatsReport>,
}

/// Result of a delegated issuance.
#[derive(Debug)]
pub enum IssueOutcome {
    /// Compact token returned by the control plane.
    Issued(String),
    /// Response to relay to the caller unchanged.
    Relay(Response),
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Client for the control plane's proxy endpoints.
#[derive(Clone)]
pub struct PrimaryClient {
    /// Control plane base URL (no trailing slash).
    base_url: String,
    /// Proxy authentication token.
    proxy_token: String,
    /// HTTP client configured with timeouts.
    client: Client,
}

impl PrimaryClient {
    /// Builds a client for the control plane at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Build`] when the HTTP client cannot be built.
    pub fn new(
        base_url: &Url,
        proxy_token: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;
        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            proxy_token: proxy_token.into(),
            client,
        })
    }

    /// Builds the proxy authentication headers.
    fn headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&self.proxy_token)
            .map_err(|_| ClientError::Build("invalid proxy token".to_string()))?;
        let name = HeaderName::from_bytes(PROXY_TOKEN_HEADER.as_bytes())
            .map_err(|_| ClientError::Build("invalid proxy token header".to_string()))?;
        headers.insert(name, value);
        Ok(headers)
    }

    /// Asks the control plane to issue a token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the control plane is unreachable or a
    /// 201 body cannot be decoded.
    pub async fn issue_signed_app_token(
        &self,
        request: &IssueTokenRequest,
    ) -> Result<IssueOutcome, ClientError> {
        let url = format!("{}{ISSUE_SIGNED_APP_TOKEN_PATH}", self.base_url);
        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        if response.status() == StatusCode::CREATED {
            let body: IssueSignedAppTokenResponse =
                response.json().await.map_err(|err| ClientError::Decode(err.to_string()))?;
            return Ok(IssueOutcome::Issued(body.signed_token_str));
        }
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| ClientError::Transport(err.to_string()))?;
        let mut relay = Response::new(Body::from(body));
        *relay.status_mut() = status;
        for (name, value) in &headers {
            if name != CONNECTION && name != TRANSFER_ENCODING {
                relay.headers_mut().append(name.clone(), value.clone());
            }
        }
        Ok(IssueOutcome::Relay(relay))
    }

    /// Uploads app stats to the control plane.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the upload fails or is rejected.
    pub async fn report_app_stats(&self, stats: &[StatsReport]) -> Result<(), ClientError> {
        let url = format!("{}{APP_STATS_PATH}", self.base_url);
        let body = ReportAppStatsRequest {
            stats: stats.to_vec(),
        };
        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ClientError::Status(format!("app stats rejected with status {status}")))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Control plane client failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Client construction failed.
    #[error("client build error: {0}")]
    Build(String),
    /// Request could not be sent or its body read.
    #[error("control plane unreachable: {0}")]
    Transport(String),
    /// Response body was not what the endpoint promises.
    #[error("control plane response decode error: {0}")]
    Decode(String),
    /// Control plane rejected the call.
    #[error("control plane error: {0}")]
    Status(String),
}
