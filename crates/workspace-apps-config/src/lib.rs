// crates/workspace-apps-config/src/lib.rs
// ============================================================================
// Module: Workspace Apps Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for workspace-apps.toml semantics.
// Dependencies: workspace-apps-core, serde, toml
// ============================================================================

//! ## Overview
//! `workspace-apps-config` defines the configuration model for the workspace
//! apps gate. Loading enforces path and size limits and validation fails
//! closed: a config that would weaken app isolation silently is rejected.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
pub use examples::proxy_config_toml_example;
