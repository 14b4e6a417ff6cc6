// crates/workspace-apps-core/src/core/records.rs
// ============================================================================
// Module: Platform Records
// Description: Users, workspaces, builds, agents, apps, port shares, API keys.
// Purpose: Typed view of the relational facts app authorization depends on.
// Dependencies: rand, serde, sha2, subtle, time
// ============================================================================

//! ## Overview
//! These records are read from the platform store during app resolution.
//! Only the fields authorization, routing, and health gating need are kept.
//! [`WorkspaceAgent::status`] derives connection health from timestamps so
//! it can be evaluated against an injected clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::Duration;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::AppId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::WorkspaceId;
use crate::core::sharing::SharingLevel;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Site-wide role name that marks deployment owners.
pub const SITE_OWNER_ROLE: &str = "owner";
/// Length of the public API key identifier.
const API_KEY_ID_LENGTH: usize = 10;
/// Length of the secret half of an API key.
const API_KEY_SECRET_LENGTH: usize = 22;

// ============================================================================
// SECTION: Users and Workspaces
// ============================================================================

/// Platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Unique username.
    pub username: String,
    /// Site-wide role names.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Workspace owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Workspace identifier.
    pub id: WorkspaceId,
    /// Owning user.
    pub owner_id: UserId,
    /// Owner username, denormalized for rendering.
    pub owner_username: String,
    /// Workspace name, unique per owner.
    pub name: String,
}

/// Lifecycle transition of a workspace build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceTransition {
    /// Workspace started.
    Start,
    /// Workspace stopped.
    Stop,
    /// Workspace deleted.
    Delete,
}

/// Workspace build record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceBuild {
    /// Workspace the build belongs to.
    pub workspace_id: WorkspaceId,
    /// Monotonic build number.
    pub build_number: u32,
    /// Transition requested by the build.
    pub transition: WorkspaceTransition,
}

// ============================================================================
// SECTION: Agents
// ============================================================================

/// Connection state of a workspace agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent has never connected and is still within its timeout.
    Connecting,
    /// Agent is connected and heartbeating.
    Connected,
    /// Agent connected once but is gone or silent.
    Disconnected,
    /// Agent never connected within its connection timeout.
    Timeout,
}

impl AgentStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workspace agent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceAgent {
    /// Agent identifier.
    pub id: AgentId,
    /// Agent name, unique per workspace.
    pub name: String,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// First successful connection.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub first_connected_at: Option<OffsetDateTime>,
    /// Most recent heartbeat.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_connected_at: Option<OffsetDateTime>,
    /// Most recent disconnect.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub disconnected_at: Option<OffsetDateTime>,
    /// Seconds an agent may take to connect before timing out (0 disables).
    #[serde(default)]
    pub connection_timeout_seconds: u32,
}

impl WorkspaceAgent {
    /// Derives the agent connection status at `now`.
    #[must_use]
    pub fn status(&self, now: OffsetDateTime, inactive_timeout: Duration) -> AgentStatus {
        if self.first_connected_at.is_none() {
            let timeout = Duration::seconds(i64::from(self.connection_timeout_seconds));
            if self.connection_timeout_seconds > 0 && now - self.created_at > timeout {
                return AgentStatus::Timeout;
            }
            return AgentStatus::Connecting;
        }
        let Some(last_connected) = self.last_connected_at else {
            return AgentStatus::Disconnected;
        };
        if self.disconnected_at.is_some_and(|disconnected| disconnected > last_connected) {
            return AgentStatus::Disconnected;
        }
        if now - last_connected > inactive_timeout {
            return AgentStatus::Disconnected;
        }
        AgentStatus::Connected
    }
}

// ============================================================================
// SECTION: Apps and Port Shares
// ============================================================================

/// App declared by a workspace agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceApp {
    /// App identifier.
    pub id: AppId,
    /// Agent serving the app.
    pub agent_id: AgentId,
    /// Slug, unique per workspace.
    pub slug: String,
    /// Upstream URL inside the agent, e.g. `http://127.0.0.1:8080`.
    #[serde(default)]
    pub url: String,
    /// Configured sharing level; unset means owner.
    #[serde(default)]
    pub sharing_level: Option<SharingLevel>,
}

/// Explicit share of a listening port on an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortShare {
    /// Workspace identifier.
    pub workspace_id: WorkspaceId,
    /// Agent name the port lives on.
    pub agent_name: String,
    /// Shared port.
    pub port: u16,
    /// Sharing level granted.
    pub share_level: SharingLevel,
}

// ============================================================================
// SECTION: API Keys
// ============================================================================

/// Permission scope carried by an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyScope {
    /// Full user permissions.
    All,
    /// Only connecting to workspace applications.
    ApplicationConnect,
}

/// Stored API key. The secret is kept only as a SHA-256 hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Public identifier (the part before `-` in a session token).
    pub id: ApiKeyId,
    /// Owning user.
    pub user_id: UserId,
    /// SHA-256 of the secret half.
    pub hashed_secret: Vec<u8>,
    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Lifetime the key was created with.
    pub lifetime_seconds: i64,
    /// Permission scope.
    pub scope: ApiKeyScope,
}

/// Freshly minted API key together with the session token to hand out.
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// Record to persist.
    pub key: ApiKey,
    /// `{id}-{secret}` token returned to the caller exactly once.
    pub token: String,
}

impl ApiKey {
    /// Generates a new API key for `user_id`.
    #[must_use]
    pub fn generate(
        user_id: UserId,
        expires_at: OffsetDateTime,
        lifetime_seconds: i64,
        scope: ApiKeyScope,
    ) -> GeneratedApiKey {
        let id = random_alphanumeric(API_KEY_ID_LENGTH);
        let secret = random_alphanumeric(API_KEY_SECRET_LENGTH);
        let token = format!("{id}-{secret}");
        GeneratedApiKey {
            key: Self {
                id: ApiKeyId::new(id),
                user_id,
                hashed_secret: hash_secret(&secret),
                expires_at,
                lifetime_seconds,
                scope,
            },
            token,
        }
    }

    /// Splits a `{id}-{secret}` session token.
    #[must_use]
    pub fn split_token(token: &str) -> Option<(ApiKeyId, &str)> {
        let (id, secret) = token.split_once('-')?;
        if id.is_empty() || secret.is_empty() {
            return None;
        }
        Some((ApiKeyId::new(id), secret))
    }

    /// Compares a presented secret against the stored hash in constant time.
    #[must_use]
    pub fn secret_matches(&self, secret: &str) -> bool {
        hash_secret(secret).ct_eq(&self.hashed_secret).into()
    }

    /// Returns true once `now` reaches the expiry.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Hashes an API key secret.
#[must_use]
pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

/// Draws `length` random ASCII alphanumerics.
fn random_alphanumeric(length: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(length).map(char::from).collect()
}
