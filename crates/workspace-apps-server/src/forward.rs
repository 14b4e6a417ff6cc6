// crates/workspace-apps-server/src/forward.rs
// ============================================================================
// Module: App Forwarding
// Description: Seam between an authorized request and the upstream app.
// Purpose: Hand the request and its signed token to whatever relays bytes.
// Dependencies: axum, async-trait, workspace-apps-core
// ============================================================================

//! ## Overview
//! After a request holds a valid [`SignedToken`], the server calls an
//! [`AppForwarder`] to produce the upstream response. Relaying bytes to the
//! agent is a deployment concern; [`EchoForwarder`] answers with a JSON
//! summary of the authorized target and is what the CLI serves by default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use axum::Json;
use axum::body::Body;
use axum::http::Request;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::AgentId;
use workspace_apps_core::SignedToken;
use workspace_apps_core::WorkspaceId;

// ============================================================================
// SECTION: Interfaces
// ============================================================================

/// Produces the upstream response for an authorized request.
#[async_trait]
pub trait AppForwarder: Send + Sync {
    /// Forwards `request` to the app named by `token`.
    async fn forward(&self, token: &SignedToken, request: Request<Body>) -> Response;
}

// ============================================================================
// SECTION: Echo Forwarder
// ============================================================================

/// Forwarder that describes the authorized target instead of proxying.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoForwarder;

/// JSON body returned by [`EchoForwarder`].
#[derive(Debug, Serialize)]
struct EchoBody<'a> {
    /// Access method.
    access_method: AccessMethod,
    /// Workspace identifier.
    workspace_id: WorkspaceId,
    /// Agent identifier.
    agent_id: AgentId,
    /// Upstream app URL.
    app_url: &'a str,
    /// Request target that would be relayed.
    path: String,
}

#[async_trait]
impl AppForwarder for EchoForwarder {
    async fn forward(&self, token: &SignedToken, request: Request<Body>) -> Response {
        let path = request.uri().path_and_query().map_or_else(|| "/".to_string(), ToString::to_string);
        Json(EchoBody {
            access_method: token.request.access_method,
            workspace_id: token.workspace_id,
            agent_id: token.agent_id,
            app_url: &token.app_url,
            path,
        })
        .into_response()
    }
}
