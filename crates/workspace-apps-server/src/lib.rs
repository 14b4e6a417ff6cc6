// crates/workspace-apps-server/src/lib.rs
// ============================================================================
// Module: Workspace Apps Server Library
// Description: HTTP surface for the workspace application gate.
// Purpose: Wire token authorities, login handoff, and stats into axum routes.
// Dependencies: workspace-apps-core, workspace-apps-config, axum, reqwest
// ============================================================================

//! ## Overview
//! `workspace-apps-server` turns the core decision engine into an HTTP
//! service. A request for an app is resolved into a signed token by a
//! [`SignedTokenProvider`] (direct on the control plane, delegating on a
//! proxy), usage is aggregated by the [`StatsCollector`], and the request is
//! handed to an [`AppForwarder`] together with its token.
//! Security posture: credentials arriving in query strings are stripped
//! before any redirect, and every error page is safe to show to the caller.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod apikey;
pub mod audit;
pub mod client;
pub mod delegating;
pub mod direct;
pub mod forward;
pub mod handoff;
pub mod pages;
pub mod params;
pub mod provider;
pub mod routes;
pub mod server;
pub mod stats;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use apikey::ApiKeyAuthenticator;
pub use audit::AppAccessAuditEvent;
pub use audit::AppAuditSink;
pub use audit::NoopAppAuditSink;
pub use audit::TracingAppAuditSink;
pub use client::ClientError;
pub use client::PrimaryClient;
pub use delegating::DelegatingTokenAuthority;
pub use delegating::ProxyStatsReporter;
pub use direct::DirectTokenAuthority;
pub use forward::AppForwarder;
pub use forward::EchoForwarder;
pub use handoff::HandoffIssuer;
pub use handoff::HandoffRedeemer;
pub use provider::IssuedToken;
pub use provider::SignedTokenProvider;
pub use server::AppsServer;
pub use server::Collaborators;
pub use server::ServerError;
pub use stats::StatsCollector;
pub use stats::StatsCollectorOptions;
pub use stats::StatsError;
