// crates/workspace-apps-core/src/interfaces/mod.rs
// ============================================================================
// Module: Workspace Apps Interfaces
// Description: Contracts for storage, RBAC, key material, usage reporting, time.
// Purpose: Keep the decision runtime independent of concrete backends.
// Dependencies: async-trait, crate::core, thiserror, time
// ============================================================================

//! ## Overview
//! The app gate consumes its collaborators through these traits. Store and
//! keycache lookups return `Ok(None)` (or a dedicated error) for missing
//! data so callers can tell "absent" apart from "backend unavailable".
//! Implementations must be `Send + Sync` and safe to share behind `Arc`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::WorkspaceId;
use crate::core::records::ApiKey;
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

// ============================================================================
// SECTION: App Store
// ============================================================================

/// Read access to the records app resolution needs.
#[async_trait]
pub trait AppStore: Send + Sync {
    /// Looks up a user by ID.
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Looks up a user by username.
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Looks up a workspace by ID.
    async fn workspace_by_id(&self, id: WorkspaceId) -> Result<Option<Workspace>, StoreError>;

    /// Looks up a workspace by owner and name.
    async fn workspace_by_owner_and_name(
        &self,
        owner_id: UserId,
        name: &str,
    ) -> Result<Option<Workspace>, StoreError>;

    /// Looks up the workspace an agent belongs to.
    async fn workspace_by_agent_id(
        &self,
        agent_id: AgentId,
    ) -> Result<Option<Workspace>, StoreError>;

    /// Looks up an agent by ID.
    async fn agent_by_id(&self, id: AgentId) -> Result<Option<WorkspaceAgent>, StoreError>;

    /// Lists the agents of the workspace's latest build.
    async fn agents_in_latest_build(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<WorkspaceAgent>, StoreError>;

    /// Returns the workspace's latest build.
    async fn latest_build(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<WorkspaceBuild>, StoreError>;

    /// Looks up an app by agent and slug.
    async fn app_by_agent_and_slug(
        &self,
        agent_id: AgentId,
        slug: &str,
    ) -> Result<Option<WorkspaceApp>, StoreError>;

    /// Looks up an explicit port share.
    async fn port_share(
        &self,
        workspace_id: WorkspaceId,
        agent_name: &str,
        port: u16,
    ) -> Result<Option<PortShare>, StoreError>;
}

/// API key persistence.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Looks up an API key by its public ID.
    async fn api_key_by_id(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, StoreError>;

    /// Persists a newly minted API key.
    async fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError>;
}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unavailable or failed.
    #[error("store backend error: {0}")]
    Backend(String),
    /// Stored data violates an invariant.
    #[error("store data invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// External RBAC policy engine.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` when `subject` may perform `action` on `object`.
    async fn authorize(
        &self,
        subject: &Subject,
        action: RbacAction,
        object: &RbacObject,
    ) -> Result<(), AuthorizeError>;
}

/// RBAC check outcome other than "allowed".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizeError {
    /// Policy denies the action.
    #[error("forbidden")]
    Forbidden,
    /// Policy engine could not be consulted.
    #[error("authorizer backend error: {0}")]
    Backend(String),
}

// ============================================================================
// SECTION: Key Material
// ============================================================================

/// HMAC key used to sign app tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    /// Key identifier written to the token header.
    pub id: String,
    /// Secret bytes.
    pub secret: Vec<u8>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("id", &self.id).finish_non_exhaustive()
    }
}

/// AES-256 key used to encrypt API key payloads.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    /// Key identifier written to the envelope header.
    pub id: String,
    /// Secret bytes.
    pub secret: [u8; 32],
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Source of signing keys; the active key signs, any known key verifies.
#[async_trait]
pub trait SigningKeycache: Send + Sync {
    /// Returns the key new tokens are signed with.
    async fn signing_key(&self) -> Result<SigningKey, KeyError>;

    /// Returns the key with the given ID for verification.
    async fn verifying_key(&self, id: &str) -> Result<SigningKey, KeyError>;
}

/// Source of encryption keys; the active key encrypts, any known key decrypts.
#[async_trait]
pub trait EncryptionKeycache: Send + Sync {
    /// Returns the key new payloads are encrypted with.
    async fn encrypting_key(&self) -> Result<EncryptionKey, KeyError>;

    /// Returns the key with the given ID for decryption.
    async fn decrypting_key(&self, id: &str) -> Result<EncryptionKey, KeyError>;
}

/// Keycache errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// No key with the requested ID.
    #[error("unknown key id: {0}")]
    UnknownKey(String),
    /// Keycache has no active key.
    #[error("no active key")]
    NoActiveKey,
    /// Key distribution backend failed.
    #[error("keycache backend error: {0}")]
    Backend(String),
}

// ============================================================================
// SECTION: Usage Reporting
// ============================================================================

/// Durable sink for aggregated app usage.
#[async_trait]
pub trait StatsReporter: Send + Sync {
    /// Persists or forwards a batch of reports.
    async fn report(&self, stats: &[StatsReport]) -> Result<(), ReportError>;
}

/// Report delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// Delivery failed; the batch may be retried.
    #[error("stats report failed: {0}")]
    Failed(String),
}

// ============================================================================
// SECTION: Time
// ============================================================================

/// Wall clock source.
pub trait Clock: Send + Sync {
    /// Returns the current time in UTC.
    fn now(&self) -> OffsetDateTime;
}
