// crates/workspace-apps-core/src/core/stats.rs
// ============================================================================
// Module: App Usage Reports
// Description: Per-session usage record derived from a signed token.
// Purpose: Wire format shared by the aggregator and its reporters.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`StatsReport`] is one app session. Open sessions have no end time;
//! reports produced by the aggregator's rollup may cover many sessions.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::WorkspaceId;
use crate::core::request::AccessMethod;
use crate::core::token::SignedToken;

/// Usage record for an app session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Workspace owner the token was issued for.
    pub user_id: UserId,
    /// Workspace identifier.
    pub workspace_id: WorkspaceId,
    /// Agent identifier.
    pub agent_id: AgentId,
    /// Access method of the session.
    pub access_method: AccessMethod,
    /// App slug or port (empty for terminals).
    pub slug_or_port: String,
    /// Session identifier.
    pub session_id: SessionId,
    /// Session start.
    #[serde(with = "time::serde::rfc3339")]
    pub session_started_at: OffsetDateTime,
    /// Session end; `None` while the session is open.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub session_ended_at: Option<OffsetDateTime>,
    /// Requests served in the session.
    pub requests: u64,
}

impl StatsReport {
    /// Starts a new one-request session report for an issued token.
    #[must_use]
    pub fn from_token(token: &SignedToken, started_at: OffsetDateTime) -> Self {
        Self {
            user_id: token.user_id,
            workspace_id: token.workspace_id,
            agent_id: token.agent_id,
            access_method: token.request.access_method,
            slug_or_port: token.request.app_slug_or_port.clone(),
            session_id: SessionId::new_random(),
            session_started_at: started_at,
            session_ended_at: None,
            requests: 1,
        }
    }
}
