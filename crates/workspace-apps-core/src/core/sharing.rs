// crates/workspace-apps-core/src/core/sharing.rs
// ============================================================================
// Module: Sharing Levels
// Description: Who besides the workspace owner may reach an app.
// Purpose: Typed sharing level used by apps, port shares, and authorization.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Sharing levels widen access beyond workspace owners. An unset level on a
//! stored app is treated as [`SharingLevel::Owner`].

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// App sharing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingLevel {
    /// Only principals RBAC allows to connect to the workspace.
    #[default]
    Owner,
    /// Any signed-in user.
    Authenticated,
    /// Anyone, including anonymous callers.
    Public,
}

impl SharingLevel {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Authenticated => "authenticated",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for SharingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
