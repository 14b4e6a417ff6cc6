// crates/workspace-apps-core/src/core/identifiers.rs
// ============================================================================
// Module: Workspace Apps Identifiers
// Description: Strongly typed identifiers for users, workspaces, and agents.
// Purpose: Keep UUID-backed IDs from being mixed up across record kinds.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Record identifiers wrap a [`Uuid`] and serialize as its hyphenated string
//! form. Request fields stay plain strings because callers address resources
//! by name *or* ID; parsing into these types happens during resolution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: UUID Identifiers
// ============================================================================

/// Declares a UUID-backed identifier newtype.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a random (v4) identifier.
            #[must_use]
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the wrapped UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_identifier! {
    /// Platform user identifier.
    UserId
}

uuid_identifier! {
    /// Workspace identifier.
    WorkspaceId
}

uuid_identifier! {
    /// Workspace agent identifier.
    AgentId
}

uuid_identifier! {
    /// Workspace application identifier.
    AppId
}

uuid_identifier! {
    /// Usage session identifier, one per proxied connection.
    SessionId
}

// ============================================================================
// SECTION: API Key Identifier
// ============================================================================

/// API key identifier (the public half of a session token).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyId(String);

impl ApiKeyId {
    /// Creates a new API key identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
