// crates/workspace-apps-server/src/audit.rs
// ============================================================================
// Module: App Access Audit
// Description: Structured audit events for workspace app access decisions.
// Purpose: Record who reached which app and with what outcome.
// Dependencies: serde, serde_json, tracing, workspace-apps-core
// ============================================================================

//! ## Overview
//! The direct token authority emits one [`AppAccessAuditEvent`] per decision
//! that resolved an app: issued tokens, denials, and agent failures. Login
//! redirects are not audited since no decision was reached yet. Sinks are
//! synchronous and must not block; the tracing sink logs the JSON payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use time::OffsetDateTime;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::AgentId;
use workspace_apps_core::UserId;
use workspace_apps_core::WorkspaceId;

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Audit event for one app access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppAccessAuditEvent {
    /// Event kind.
    pub event: &'static str,
    /// Decision time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Caller, when authenticated.
    pub user_id: Option<UserId>,
    /// Workspace owner username.
    pub workspace_owner: String,
    /// Workspace identifier.
    pub workspace_id: WorkspaceId,
    /// Workspace name.
    pub workspace_name: String,
    /// Agent identifier.
    pub agent_id: AgentId,
    /// App slug or port; empty for terminals.
    pub app: String,
    /// Access method.
    pub access_method: AccessMethod,
    /// HTTP status returned to the caller.
    pub status: u16,
}

/// Inputs for building an [`AppAccessAuditEvent`].
pub struct AppAccessAuditParams {
    /// Decision time.
    pub timestamp: OffsetDateTime,
    /// Caller, when authenticated.
    pub user_id: Option<UserId>,
    /// Workspace owner username.
    pub workspace_owner: String,
    /// Workspace identifier.
    pub workspace_id: WorkspaceId,
    /// Workspace name.
    pub workspace_name: String,
    /// Agent identifier.
    pub agent_id: AgentId,
    /// App slug or port.
    pub app: String,
    /// Access method.
    pub access_method: AccessMethod,
    /// HTTP status.
    pub status: u16,
}

impl AppAccessAuditEvent {
    /// Builds an event from params.
    #[must_use]
    pub fn new(params: AppAccessAuditParams) -> Self {
        Self {
            event: "workspace_app_access",
            timestamp: params.timestamp,
            user_id: params.user_id,
            workspace_owner: params.workspace_owner,
            workspace_id: params.workspace_id,
            workspace_name: params.workspace_name,
            agent_id: params.agent_id,
            app: params.app,
            access_method: params.access_method,
            status: params.status,
        }
    }
}

// ============================================================================
// SECTION: Audit Sinks
// ============================================================================

/// Audit sink for app access events.
pub trait AppAuditSink: Send + Sync {
    /// Records an access event.
    fn record(&self, event: &AppAccessAuditEvent);
}

/// Audit sink that drops events.
pub struct NoopAppAuditSink;

impl AppAuditSink for NoopAppAuditSink {
    fn record(&self, _event: &AppAccessAuditEvent) {}
}

/// Audit sink that logs JSON events through `tracing`.
pub struct TracingAppAuditSink;

impl AppAuditSink for TracingAppAuditSink {
    fn record(&self, event: &AppAccessAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            tracing::info!(target: "workspace_apps::audit", %payload, "app access");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use time::macros::datetime;

    use super::*;

    fn event(user_id: Option<UserId>) -> AppAccessAuditEvent {
        AppAccessAuditEvent::new(AppAccessAuditParams {
            timestamp: datetime!(2024-05-01 12:00 UTC),
            user_id,
            workspace_owner: "alice".to_string(),
            workspace_id: WorkspaceId::new_random(),
            workspace_name: "dev".to_string(),
            agent_id: AgentId::new_random(),
            app: "code".to_string(),
            access_method: AccessMethod::Subdomain,
            status: 404,
        })
    }

    #[test]
    fn event_serializes_with_kind_and_rfc3339_time() {
        let value = serde_json::to_value(event(None)).unwrap();
        assert_eq!(value["event"], "workspace_app_access");
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(value["user_id"], serde_json::Value::Null);
        assert_eq!(value["access_method"], "subdomain");
        assert_eq!(value["status"], 404);
    }

    #[test]
    fn sinks_accept_events() {
        let user = UserId::new_random();
        let event = event(Some(user));
        let sinks: [&dyn AppAuditSink; 2] = [&NoopAppAuditSink, &TracingAppAuditSink];
        for sink in sinks {
            sink.record(&event);
        }
        assert_eq!(event.user_id, Some(user));
    }
}
