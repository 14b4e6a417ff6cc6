// crates/workspace-apps-core/src/runtime/mod.rs
// ============================================================================
// Module: Workspace Apps Runtime
// Description: Token crypto, app resolution, authorization, and in-memory backends.
// Purpose: Implement the decision pipeline on top of the core interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime turns a normalized request into resolved platform facts
//! ([`AppResolver`]), decides access ([`AppAuthorizer`]), and signs, verifies,
//! encrypts, or decrypts the resulting credentials ([`sign_token`],
//! [`verify_token`], [`encrypt_payload`], [`decrypt_payload`]). In-memory
//! collaborators back tests and single-node deployments.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod authorize;
pub mod clock;
pub mod jwt;
pub mod keys;
pub mod resolve;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use authorize::AppAccessPolicy;
pub use authorize::AppAuthorizer;
pub use authorize::AuthzOutcome;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use jwt::ClaimExpectations;
pub use jwt::TokenError;
pub use jwt::decrypt_payload;
pub use jwt::encrypt_payload;
pub use jwt::sign_token;
pub use jwt::verify_token;
pub use keys::StaticKeycache;
pub use resolve::AppResolver;
pub use resolve::ResolveError;
pub use resolve::ResolvedApp;
pub use store::InMemoryAppStore;
pub use store::InMemoryStatsReporter;
pub use store::RoleAuthorizer;
pub use store::StoreSeed;
