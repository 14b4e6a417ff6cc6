// crates/workspace-apps-core/src/lib.rs
// ============================================================================
// Module: Workspace Apps Core Library
// Description: Public API surface for the workspace application gate core.
// Purpose: Expose request, token, and record types plus the decision runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Workspace apps core decides whether a caller may reach an application
//! running inside a workspace agent, and mints the compact signed credential
//! that lets later requests skip the full decision. It is storage-agnostic and
//! integrates through explicit interfaces (store, RBAC, keycaches, reporter).
//! Security posture: every request field is untrusted until normalized and
//! checked.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::ApiKeyStore;
pub use interfaces::AppStore;
pub use interfaces::AuthorizeError;
pub use interfaces::Authorizer;
pub use interfaces::Clock;
pub use interfaces::EncryptionKey;
pub use interfaces::EncryptionKeycache;
pub use interfaces::KeyError;
pub use interfaces::ReportError;
pub use interfaces::SigningKey;
pub use interfaces::SigningKeycache;
pub use interfaces::StatsReporter;
pub use interfaces::StoreError;
pub use runtime::AppAccessPolicy;
pub use runtime::AppAuthorizer;
pub use runtime::AppResolver;
pub use runtime::AuthzOutcome;
pub use runtime::ClaimExpectations;
pub use runtime::InMemoryAppStore;
pub use runtime::InMemoryStatsReporter;
pub use runtime::ManualClock;
pub use runtime::ResolveError;
pub use runtime::ResolvedApp;
pub use runtime::RoleAuthorizer;
pub use runtime::StaticKeycache;
pub use runtime::StoreSeed;
pub use runtime::SystemClock;
pub use runtime::TokenError;
pub use runtime::decrypt_payload;
pub use runtime::encrypt_payload;
pub use runtime::sign_token;
pub use runtime::verify_token;
