// crates/workspace-apps-core/src/core/subject.rs
// ============================================================================
// Module: RBAC Subjects
// Description: Authenticated principal, actions, and objects for RBAC checks.
// Purpose: Shape the inputs handed to the external policy engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The policy engine is an external collaborator; these types are the only
//! vocabulary app authorization uses when asking it a question.

use serde::Serialize;

use crate::core::identifiers::UserId;
use crate::core::identifiers::WorkspaceId;
use crate::core::records::ApiKeyScope;
use crate::core::records::SITE_OWNER_ROLE;

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Caller user identifier.
    pub user_id: UserId,
    /// Site-wide role names.
    pub roles: Vec<String>,
    /// Scope of the API key the caller authenticated with.
    pub scope: ApiKeyScope,
}

impl Subject {
    /// Returns true when the caller holds the site owner role.
    #[must_use]
    pub fn is_site_owner(&self) -> bool {
        self.roles.iter().any(|role| role == SITE_OWNER_ROLE)
    }
}

/// Action checked against a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RbacAction {
    /// Connect to a workspace application.
    ApplicationConnect,
    /// Open a terminal session.
    Ssh,
}

/// Workspace object checked by RBAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RbacObject {
    /// Specific workspace, or `None` for "any workspace owned by `owner_id`".
    pub workspace_id: Option<WorkspaceId>,
    /// Owner the object is scoped to.
    pub owner_id: UserId,
}

impl RbacObject {
    /// Object for a concrete workspace.
    #[must_use]
    pub const fn workspace(workspace_id: WorkspaceId, owner_id: UserId) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            owner_id,
        }
    }

    /// Object for any workspace owned by `owner_id`.
    #[must_use]
    pub const fn owned_by(owner_id: UserId) -> Self {
        Self {
            workspace_id: None,
            owner_id,
        }
    }
}
