// crates/workspace-apps-core/src/runtime/resolve.rs
// ============================================================================
// Module: App Resolution
// Description: Resolve a normalized request into owner, workspace, agent, app.
// Purpose: Gather the platform facts authorization and signing depend on.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! Resolution maps the names and IDs in a [`Request`] onto stored records:
//!
//! - Terminal: agent by UUID, then its workspace, then the workspace owner.
//!   Terminals always resolve with the `owner` sharing level.
//! - Path and subdomain: owner by UUID or username, workspace by UUID or
//!   owner + name, agents of the latest build, then the app. A numeric slug
//!   addresses a listening port (subdomain only) and defaults to `owner`
//!   unless an explicit port share exists.
//!
//! Anything missing surfaces as [`ResolveError::NotFound`]; a latest build
//! that stopped the workspace surfaces as [`ResolveError::WorkspaceStopped`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::appurl::parse_port_slug;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::WorkspaceId;
use crate::core::records::User;
use crate::core::records::Workspace;
use crate::core::records::WorkspaceAgent;
use crate::core::records::WorkspaceTransition;
use crate::core::request::AccessMethod;
use crate::core::request::Request;
use crate::core::sharing::SharingLevel;
use crate::interfaces::AppStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Platform facts behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApp {
    /// Normalized request that was resolved.
    pub request: Request,
    /// Workspace owner.
    pub owner: User,
    /// Workspace.
    pub workspace: Workspace,
    /// Agent serving the app.
    pub agent: WorkspaceAgent,
    /// Upstream URL; empty for terminals.
    pub app_url: String,
    /// Configured sharing level before deployment policy is applied.
    pub sharing_level: SharingLevel,
}

/// Resolves requests against an [`AppStore`].
#[derive(Clone)]
pub struct AppResolver {
    /// Backing store.
    store: Arc<dyn AppStore>,
}

impl AppResolver {
    /// Creates a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AppStore>) -> Self {
        Self {
            store,
        }
    }

    /// Resolves a normalized, checked request.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when a record is missing, the workspace is
    /// stopped, the request cannot be served, or the store fails.
    pub async fn resolve(&self, request: &Request) -> Result<ResolvedApp, ResolveError> {
        if request.access_method == AccessMethod::Terminal {
            return self.resolve_terminal(request).await;
        }

        let owner = self.resolve_user(&request.username_or_id).await?;
        let workspace = self.resolve_workspace(&owner, &request.workspace_name_or_id).await?;
        let build = self
            .store
            .latest_build(workspace.id)
            .await?
            .ok_or_else(|| not_found("workspace has no builds"))?;
        if build.transition == WorkspaceTransition::Stop {
            return Err(ResolveError::WorkspaceStopped);
        }
        let agents = self.store.agents_in_latest_build(workspace.id).await?;
        if agents.is_empty() {
            return Err(not_found("no agents in workspace"));
        }

        let (agent, app_url, sharing_level) = match parse_port_slug(&request.app_slug_or_port) {
            Some((port, protocol)) => {
                if request.access_method != AccessMethod::Subdomain {
                    return Err(ResolveError::Invalid(
                        "port-based URLs are only supported for subdomain apps".to_string(),
                    ));
                }
                let agent = select_agent(&agents, &request.agent_name_or_id)?;
                let sharing_level = self
                    .store
                    .port_share(workspace.id, &agent.name, port)
                    .await?
                    .map_or(SharingLevel::Owner, |share| share.share_level);
                let url = format!("{}://127.0.0.1:{port}", protocol.scheme());
                (agent, url, sharing_level)
            }
            None => {
                let candidates: Vec<&WorkspaceAgent> = if request.agent_name_or_id.is_empty() {
                    agents.iter().collect()
                } else {
                    vec![select_agent(&agents, &request.agent_name_or_id)?]
                };
                let mut found = None;
                for agent in candidates {
                    if let Some(app) =
                        self.store.app_by_agent_and_slug(agent.id, &request.app_slug_or_port).await?
                    {
                        found = Some((agent, app));
                        break;
                    }
                }
                let (agent, app) = found.ok_or_else(|| {
                    not_found(format!("app \"{}\" not found", request.app_slug_or_port))
                })?;
                (agent, app.url, app.sharing_level.unwrap_or_default())
            }
        };

        Ok(ResolvedApp {
            request: request.clone(),
            owner,
            workspace,
            agent: agent.clone(),
            app_url,
            sharing_level,
        })
    }

    /// Resolves a terminal request from its agent UUID.
    async fn resolve_terminal(&self, request: &Request) -> Result<ResolvedApp, ResolveError> {
        let agent_id: AgentId = request
            .agent_name_or_id
            .parse()
            .map_err(|_| ResolveError::Invalid("terminal agent must be a UUID".to_string()))?;
        let agent =
            self.store.agent_by_id(agent_id).await?.ok_or_else(|| not_found("agent not found"))?;
        let workspace = self
            .store
            .workspace_by_agent_id(agent_id)
            .await?
            .ok_or_else(|| not_found("workspace for agent not found"))?;
        let owner = self
            .store
            .user_by_id(workspace.owner_id)
            .await?
            .ok_or_else(|| not_found("workspace owner not found"))?;
        Ok(ResolvedApp {
            request: request.clone(),
            owner,
            workspace,
            agent,
            app_url: String::new(),
            sharing_level: SharingLevel::Owner,
        })
    }

    /// Looks up a user by UUID or username.
    async fn resolve_user(&self, username_or_id: &str) -> Result<User, ResolveError> {
        let user = match username_or_id.parse::<UserId>() {
            Ok(id) => self.store.user_by_id(id).await?,
            Err(_) => self.store.user_by_username(username_or_id).await?,
        };
        user.ok_or_else(|| not_found(format!("user \"{username_or_id}\" not found")))
    }

    /// Looks up a workspace by UUID or by owner and name.
    ///
    /// Workspaces addressed by UUID must still belong to the addressed user.
    async fn resolve_workspace(
        &self,
        owner: &User,
        name_or_id: &str,
    ) -> Result<Workspace, ResolveError> {
        let workspace = match name_or_id.parse::<WorkspaceId>() {
            Ok(id) => self.store.workspace_by_id(id).await?.filter(|ws| ws.owner_id == owner.id),
            Err(_) => self.store.workspace_by_owner_and_name(owner.id, name_or_id).await?,
        };
        workspace.ok_or_else(|| not_found(format!("workspace \"{name_or_id}\" not found")))
    }
}

/// Picks an agent by UUID, as the only agent, or by name.
fn select_agent<'a>(
    agents: &'a [WorkspaceAgent],
    name_or_id: &str,
) -> Result<&'a WorkspaceAgent, ResolveError> {
    if name_or_id.is_empty() {
        return match agents {
            [only] => Ok(only),
            _ => Err(not_found("multiple agents in workspace, agent name is required")),
        };
    }
    let by_id = name_or_id.parse::<AgentId>().ok();
    agents
        .iter()
        .find(|agent| by_id == Some(agent.id) || agent.name == name_or_id)
        .ok_or_else(|| not_found(format!("agent \"{name_or_id}\" not found")))
}

/// Shorthand for [`ResolveError::NotFound`].
fn not_found(message: impl Into<String>) -> ResolveError {
    ResolveError::NotFound(message.into())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The latest build stopped the workspace.
    #[error("workspace is stopped")]
    WorkspaceStopped,
    /// The request cannot be served as addressed.
    #[error("unresolvable request: {0}")]
    Invalid(String),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
