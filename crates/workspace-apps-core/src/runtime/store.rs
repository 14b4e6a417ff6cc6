// crates/workspace-apps-core/src/runtime/store.rs
// ============================================================================
// Module: Workspace Apps In-Memory Backends
// Description: In-memory app store, API key store, RBAC, and stats sink.
// Purpose: Deterministic collaborators for tests and single-node runs.
// Dependencies: async-trait, crate::{core, interfaces}, serde
// ============================================================================

//! ## Overview
//! [`InMemoryAppStore`] implements both [`AppStore`] and [`ApiKeyStore`] over
//! mutex-guarded collections and can be seeded from JSON ([`StoreSeed`]).
//! [`RoleAuthorizer`] is a minimal RBAC stand-in: site owners and workspace
//! owners may connect, and application-connect keys may not open terminals.
//! [`InMemoryStatsReporter`] records batches and can be told to fail.
//! None of these are intended for multi-replica production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::WorkspaceId;
use crate::core::records::ApiKey;
use crate::core::records::ApiKeyScope;
use crate::core::records::PortShare;
use crate::core::records::User;
use crate::core::records::Workspace;
use crate::core::records::WorkspaceAgent;
use crate::core::records::WorkspaceApp;
use crate::core::records::WorkspaceBuild;
use crate::core::stats::StatsReport;
use crate::core::subject::RbacAction;
use crate::core::subject::RbacObject;
use crate::core::subject::Subject;
use crate::interfaces::ApiKeyStore;
use crate::interfaces::AppStore;
use crate::interfaces::AuthorizeError;
use crate::interfaces::Authorizer;
use crate::interfaces::ReportError;
use crate::interfaces::StatsReporter;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Seed
// ============================================================================

/// Agent record paired with the workspace build it runs in.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAgent {
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Build that created the agent; the workspace's latest build when unset.
    #[serde(default)]
    pub build_number: Option<u32>,
    /// Agent record.
    #[serde(flatten)]
    pub agent: WorkspaceAgent,
}

/// JSON fixture for populating an [`InMemoryAppStore`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSeed {
    /// Users.
    #[serde(default)]
    pub users: Vec<User>,
    /// Workspaces.
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    /// Builds.
    #[serde(default)]
    pub builds: Vec<WorkspaceBuild>,
    /// Agents with their workspace.
    #[serde(default)]
    pub agents: Vec<SeedAgent>,
    /// Apps.
    #[serde(default)]
    pub apps: Vec<WorkspaceApp>,
    /// Port shares.
    #[serde(default)]
    pub port_shares: Vec<PortShare>,
}

// ============================================================================
// SECTION: In-Memory App Store
// ============================================================================

/// Mutable store contents.
#[derive(Debug, Default)]
struct StoreState {
    /// Users by ID.
    users: BTreeMap<UserId, User>,
    /// Workspaces by ID.
    workspaces: BTreeMap<WorkspaceId, Workspace>,
    /// Builds per workspace, in insertion order.
    builds: BTreeMap<WorkspaceId, Vec<WorkspaceBuild>>,
    /// Agents with their workspace, in insertion order.
    agents: Vec<SeedAgent>,
    /// Apps.
    apps: Vec<WorkspaceApp>,
    /// Port shares.
    port_shares: Vec<PortShare>,
    /// API keys by ID.
    api_keys: BTreeMap<ApiKeyId, ApiKey>,
}

/// In-memory app and API key store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAppStore {
    /// Store contents protected by a mutex.
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryAppStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store populated from a seed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the seed references unknown records.
    pub fn from_seed(seed: StoreSeed) -> Result<Self, StoreError> {
        let store = Self::new();
        for user in seed.users {
            store.insert_user(user)?;
        }
        for workspace in seed.workspaces {
            store.insert_workspace(workspace)?;
        }
        for build in seed.builds {
            store.insert_build(build)?;
        }
        for entry in seed.agents {
            store.attach_agent(entry)?;
        }
        for app in seed.apps {
            store.insert_app(app)?;
        }
        for share in seed.port_shares {
            store.insert_port_share(share)?;
        }
        Ok(store)
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Backend("app store mutex poisoned".to_string()))
    }

    /// Inserts or replaces a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.lock()?.users.insert(user.id, user);
        Ok(())
    }

    /// Inserts or replaces a workspace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the owner is unknown.
    pub fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&workspace.owner_id) {
            return Err(StoreError::Invalid(format!(
                "workspace {} references unknown owner {}",
                workspace.id, workspace.owner_id
            )));
        }
        state.workspaces.insert(workspace.id, workspace);
        Ok(())
    }

    /// Appends a build; the last inserted build is the latest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the workspace is unknown.
    pub fn insert_build(&self, build: WorkspaceBuild) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.workspaces.contains_key(&build.workspace_id) {
            return Err(StoreError::Invalid(format!(
                "build references unknown workspace {}",
                build.workspace_id
            )));
        }
        state.builds.entry(build.workspace_id).or_default().push(build);
        Ok(())
    }

    /// Attaches an agent to the workspace's latest build.
    ///
    /// Agents stay with the build they were inserted under; a later build
    /// starts without agents until new ones are attached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the workspace is unknown.
    pub fn insert_agent(
        &self,
        workspace_id: WorkspaceId,
        agent: WorkspaceAgent,
    ) -> Result<(), StoreError> {
        self.attach_agent(SeedAgent {
            workspace_id,
            build_number: None,
            agent,
        })
    }

    /// Stores an agent under its build, defaulting to the latest one.
    fn attach_agent(&self, mut entry: SeedAgent) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.workspaces.contains_key(&entry.workspace_id) {
            return Err(StoreError::Invalid(format!(
                "agent references unknown workspace {}",
                entry.workspace_id
            )));
        }
        if entry.build_number.is_none() {
            entry.build_number = latest_build_number(&state, entry.workspace_id);
        }
        state.agents.retain(|existing| existing.agent.id != entry.agent.id);
        state.agents.push(entry);
        Ok(())
    }

    /// Replaces an agent record in place (heartbeats, disconnects).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the agent is unknown.
    pub fn update_agent(&self, agent: WorkspaceAgent) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let entry = state
            .agents
            .iter_mut()
            .find(|entry| entry.agent.id == agent.id)
            .ok_or_else(|| StoreError::Invalid(format!("unknown agent {}", agent.id)))?;
        entry.agent = agent;
        Ok(())
    }

    /// Inserts an app.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the agent is unknown.
    pub fn insert_app(&self, app: WorkspaceApp) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.agents.iter().any(|entry| entry.agent.id == app.agent_id) {
            return Err(StoreError::Invalid(format!("app references unknown agent {}", app.agent_id)));
        }
        state.apps.retain(|existing| existing.id != app.id);
        state.apps.push(app);
        Ok(())
    }

    /// Inserts a port share.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn insert_port_share(&self, share: PortShare) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.port_shares.retain(|existing| {
            !(existing.workspace_id == share.workspace_id
                && existing.agent_name == share.agent_name
                && existing.port == share.port)
        });
        state.port_shares.push(share);
        Ok(())
    }
}

/// Build number of the workspace's most recently inserted build.
fn latest_build_number(state: &StoreState, workspace_id: WorkspaceId) -> Option<u32> {
    state.builds.get(&workspace_id).and_then(|builds| builds.last()).map(|build| build.build_number)
}

#[async_trait]
impl AppStore for InMemoryAppStore {
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.values().find(|user| user.username == username).cloned())
    }

    async fn workspace_by_id(&self, id: WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        Ok(self.lock()?.workspaces.get(&id).cloned())
    }

    async fn workspace_by_owner_and_name(
        &self,
        owner_id: UserId,
        name: &str,
    ) -> Result<Option<Workspace>, StoreError> {
        Ok(self
            .lock()?
            .workspaces
            .values()
            .find(|ws| ws.owner_id == owner_id && ws.name == name)
            .cloned())
    }

    async fn workspace_by_agent_id(
        &self,
        agent_id: AgentId,
    ) -> Result<Option<Workspace>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .agents
            .iter()
            .find(|entry| entry.agent.id == agent_id)
            .and_then(|entry| state.workspaces.get(&entry.workspace_id))
            .cloned())
    }

    async fn agent_by_id(&self, id: AgentId) -> Result<Option<WorkspaceAgent>, StoreError> {
        Ok(self
            .lock()?
            .agents
            .iter()
            .find(|entry| entry.agent.id == id)
            .map(|entry| entry.agent.clone()))
    }

    async fn agents_in_latest_build(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<WorkspaceAgent>, StoreError> {
        let state = self.lock()?;
        let latest = latest_build_number(&state, workspace_id);
        Ok(state
            .agents
            .iter()
            .filter(|entry| entry.workspace_id == workspace_id && entry.build_number == latest)
            .map(|entry| entry.agent.clone())
            .collect())
    }

    async fn latest_build(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<WorkspaceBuild>, StoreError> {
        Ok(self.lock()?.builds.get(&workspace_id).and_then(|builds| builds.last()).cloned())
    }

    async fn app_by_agent_and_slug(
        &self,
        agent_id: AgentId,
        slug: &str,
    ) -> Result<Option<WorkspaceApp>, StoreError> {
        Ok(self
            .lock()?
            .apps
            .iter()
            .find(|app| app.agent_id == agent_id && app.slug == slug)
            .cloned())
    }

    async fn port_share(
        &self,
        workspace_id: WorkspaceId,
        agent_name: &str,
        port: u16,
    ) -> Result<Option<PortShare>, StoreError> {
        Ok(self
            .lock()?
            .port_shares
            .iter()
            .find(|share| {
                share.workspace_id == workspace_id
                    && share.agent_name == agent_name
                    && share.port == port
            })
            .cloned())
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryAppStore {
    async fn api_key_by_id(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.lock()?.api_keys.get(id).cloned())
    }

    async fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError> {
        self.lock()?.api_keys.insert(key.id.clone(), key);
        Ok(())
    }
}

// ============================================================================
// SECTION: Role Authorizer
// ============================================================================

/// Minimal RBAC: site owners and workspace owners may connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn authorize(
        &self,
        subject: &Subject,
        action: RbacAction,
        object: &RbacObject,
    ) -> Result<(), AuthorizeError> {
        if subject.scope == ApiKeyScope::ApplicationConnect
            && action != RbacAction::ApplicationConnect
        {
            return Err(AuthorizeError::Forbidden);
        }
        if subject.is_site_owner() || object.owner_id == subject.user_id {
            return Ok(());
        }
        Err(AuthorizeError::Forbidden)
    }
}

// ============================================================================
// SECTION: In-Memory Stats Reporter
// ============================================================================

/// Stats reporter that records batches in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStatsReporter {
    /// Delivered batches.
    batches: Arc<Mutex<Vec<Vec<StatsReport>>>>,
    /// When set, every report call fails.
    failing: Arc<AtomicBool>,
}

impl InMemoryStatsReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent report calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns every delivered batch.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<StatsReport>> {
        self.batches.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns every delivered report, flattened.
    #[must_use]
    pub fn reports(&self) -> Vec<StatsReport> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl StatsReporter for InMemoryStatsReporter {
    async fn report(&self, stats: &[StatsReport]) -> Result<(), ReportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReportError::Failed("reporter configured to fail".to_string()));
        }
        self.batches
            .lock()
            .map_err(|_| ReportError::Failed("stats reporter mutex poisoned".to_string()))?
            .push(stats.to_vec());
        Ok(())
    }
}
