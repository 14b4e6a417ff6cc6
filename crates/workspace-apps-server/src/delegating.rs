// crates/workspace-apps-server/src/delegating.rs
// ============================================================================
// Module: Delegating Token Authority
// Description: Proxy-side token issuance and stats reporting.
// Purpose: Let a proxy host serve apps without direct store access.
// Dependencies: axum, async-trait, tracing, workspace-apps-core
// ============================================================================

//! ## Overview
//! On a proxy host, [`DelegatingTokenAuthority`] forwards the
//! [`IssueTokenRequest`] to the control plane and verifies the returned
//! token locally with the shared signing keys before trusting it. Anything
//! other than a 201 from the control plane is relayed to the caller as-is,
//! so login redirects and error pages look the same on every host.
//! [`ProxyStatsReporter`] ships aggregated stats the same way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;
use axum::response::Response;
use workspace_apps_core::ClaimExpectations;
use workspace_apps_core::Clock;
use workspace_apps_core::IssueTokenRequest;
use workspace_apps_core::ReportError;
use workspace_apps_core::SignedToken;
use workspace_apps_core::SigningKeycache;
use workspace_apps_core::StatsReport;
use workspace_apps_core::StatsReporter;
use workspace_apps_core::verify_token;

use crate::apikey::app_session_token;
use crate::client::IssueOutcome;
use crate::client::PrimaryClient;
use crate::pages::ErrorPage;
use crate::provider::IssuedToken;
use crate::provider::SignedTokenProvider;
use crate::provider::token_from_request;

// ============================================================================
// SECTION: Delegating Authority
// ============================================================================

/// Token authority that asks the control plane to issue tokens.
pub struct DelegatingTokenAuthority {
    /// Control plane client.
    client: PrimaryClient,
    /// Signing keys shared with the control plane.
    keycache: Arc<dyn SigningKeycache>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl DelegatingTokenAuthority {
    /// Creates a delegating authority.
    #[must_use]
    pub fn new(client: PrimaryClient, keycache: Arc<dyn SigningKeycache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            keycache,
            clock,
        }
    }
}

#[async_trait]
impl SignedTokenProvider for DelegatingTokenAuthority {
    async fn from_request(&self, parts: &Parts) -> Option<SignedToken> {
        token_from_request(self.keycache.as_ref(), self.clock.now(), parts).await
    }

    async fn issue(&self, parts: &Parts, mut request: IssueTokenRequest) -> Result<IssuedToken, Response> {
        if request.session_token.is_empty()
            && let Some(token) = app_session_token(&parts.headers, request.app_request.access_method)
        {
            request.session_token = token;
        }
        let outcome = self.client.issue_signed_app_token(&request).await.map_err(|err| {
            tracing::warn!(error = %err, "could not issue app token through the control plane");
            ErrorPage::internal_error("Could not reach the control plane to authorize the request.")
                .render(&parts.headers)
        })?;
        let serialized = match outcome {
            IssueOutcome::Issued(serialized) => serialized,
            IssueOutcome::Relay(response) => return Err(response),
        };
        let expectations = ClaimExpectations::at(self.clock.now());
        let token = verify_token::<SignedToken>(self.keycache.as_ref(), &serialized, &expectations)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "control plane issued an unverifiable app token");
                ErrorPage::internal_error("Could not verify the issued token.").render(&parts.headers)
            })?;
        Ok(IssuedToken {
            token,
            serialized,
        })
    }
}

// ============================================================================
// SECTION: Proxy Stats Reporter
// ============================================================================

/// Stats reporter that uploads to the control plane.
pub struct ProxyStatsReporter {
    /// Control plane client.
    client: PrimaryClient,
}

impl ProxyStatsReporter {
    /// Creates a reporter.
    #[must_use]
    pub const fn new(client: PrimaryClient) -> Self {
        Self {
            client,
        }
    }
}

#[async_trait]
impl StatsReporter for ProxyStatsReporter {
    async fn report(&self, stats: &[StatsReport]) -> Result<(), ReportError> {
        self.client.report_app_stats(stats).await.map_err(|err| ReportError::Failed(err.to_string()))
    }
}
