// crates/workspace-apps-core/src/core/mod.rs
// ============================================================================
// Module: Workspace Apps Core Types
// Description: Canonical request, token, record, and usage types.
// Purpose: Provide stable, serializable types shared by issuers and proxies.
// Dependencies: serde, time, url, uuid
// ============================================================================

//! ## Overview
//! Core types describe what a caller asked for ([`Request`]), what the
//! platform knows about the target ([`Workspace`], [`WorkspaceAgent`],
//! [`WorkspaceApp`]), and what gets minted or reported ([`SignedToken`],
//! [`StatsReport`]). These types are the wire format between the control
//! plane and proxy replicas, so field names are stable.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod appurl;
pub mod identifiers;
pub mod records;
pub mod request;
pub mod sharing;
pub mod stats;
pub mod subject;
pub mod token;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use appurl::AppUrlError;
pub use appurl::ApplicationUrl;
pub use appurl::HostnamePattern;
pub use appurl::PortProtocol;
pub use appurl::parse_port_slug;
pub use appurl::strip_port;
pub use identifiers::AgentId;
pub use identifiers::ApiKeyId;
pub use identifiers::AppId;
pub use identifiers::SessionId;
pub use identifiers::UserId;
pub use identifiers::WorkspaceId;
pub use records::AgentStatus;
pub use records::ApiKey;
pub use records::ApiKeyScope;
pub use records::GeneratedApiKey;
pub use records::PortShare;
pub use records::SITE_OWNER_ROLE;
pub use records::User;
pub use records::Workspace;
pub use records::WorkspaceAgent;
pub use records::WorkspaceApp;
pub use records::WorkspaceBuild;
pub use records::WorkspaceTransition;
pub use request::AccessMethod;
pub use request::IssueTokenRequest;
pub use request::Request;
pub use request::RequestError;
pub use sharing::SharingLevel;
pub use stats::StatsReport;
pub use subject::RbacAction;
pub use subject::RbacObject;
pub use subject::Subject;
pub use token::API_KEY_AUDIENCE;
pub use token::API_KEY_ISSUER;
pub use token::APP_CONNECT_API_KEY_QUERY_PARAMETER;
pub use token::Claims;
pub use token::DEFAULT_TOKEN_LIFETIME;
pub use token::EncryptedApiKeyPayload;
pub use token::MAX_TOKEN_CANDIDATES;
pub use token::PATH_APP_SESSION_TOKEN_COOKIE;
pub use token::PROXY_TOKEN_HEADER;
pub use token::REDIRECT_URI_QUERY_PARAMETER;
pub use token::RegisteredClaims;
pub use token::SESSION_TOKEN_COOKIE;
pub use token::SESSION_TOKEN_HEADER;
pub use token::SIGNED_APP_TOKEN_COOKIE;
pub use token::SIGNED_APP_TOKEN_QUERY_PARAMETER;
pub use token::SUBDOMAIN_APP_SESSION_TOKEN_COOKIE;
pub use token::SignedToken;
