// crates/workspace-apps-core/src/runtime/authorize.rs
// ============================================================================
// Module: App Authorization
// Description: Sharing-level decision over RBAC for a resolved app.
// Purpose: Decide allow/deny and explain misconfiguration with warnings.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The decision runs in a fixed order:
//!
//! 1. Path apps fall back to the `owner` sharing level unless path app
//!    sharing is enabled for the deployment (with a warning when the app
//!    asked for more).
//! 2. Anonymous callers only reach `public` apps.
//! 3. Owner-level path apps are closed to non-owners, site owners included,
//!    unless site-owner path access is enabled.
//! 4. RBAC `application_connect` (`ssh` for terminals) on the workspace.
//! 5. Sharing level fallbacks: `authenticated` re-checks RBAC against a
//!    workspace owned by the caller; `public` allows.
//!
//! Only an unreachable policy engine is an error; a denial is a normal
//! outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::request::AccessMethod;
use crate::core::sharing::SharingLevel;
use crate::core::subject::RbacAction;
use crate::core::subject::RbacObject;
use crate::core::subject::Subject;
use crate::interfaces::AuthorizeError;
use crate::interfaces::Authorizer;
use crate::runtime::resolve::ResolvedApp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Deployment-wide switches that loosen path app isolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppAccessPolicy {
    /// Honor non-owner sharing levels on path apps.
    pub allow_path_app_sharing: bool,
    /// Let site owners reach other users' owner-level path apps.
    pub allow_path_app_site_owner_access: bool,
}

/// Authorization decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthzOutcome {
    /// Whether access is granted.
    pub allowed: bool,
    /// Operator-facing explanations, safe to show to the caller.
    pub warnings: Vec<String>,
}

impl AuthzOutcome {
    /// Allowed with no warnings.
    fn allow() -> Self {
        Self {
            allowed: true,
            warnings: Vec::new(),
        }
    }

    /// Denied with the accumulated warnings.
    const fn deny(warnings: Vec<String>) -> Self {
        Self {
            allowed: false,
            warnings,
        }
    }
}

/// App access decision engine.
#[derive(Clone)]
pub struct AppAuthorizer {
    /// External RBAC engine.
    rbac: Arc<dyn Authorizer>,
    /// Deployment policy.
    policy: AppAccessPolicy,
}

impl AppAuthorizer {
    /// Creates an authorizer.
    #[must_use]
    pub fn new(rbac: Arc<dyn Authorizer>, policy: AppAccessPolicy) -> Self {
        Self {
            rbac,
            policy,
        }
    }

    /// Decides whether `subject` (or an anonymous caller) may reach `app`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizeError::Backend`] when the RBAC engine fails.
    pub async fn authorize(
        &self,
        subject: Option<&Subject>,
        app: &ResolvedApp,
    ) -> Result<AuthzOutcome, AuthorizeError> {
        let access_method = app.request.access_method;
        let is_path_app = access_method == AccessMethod::Path;
        let mut warnings = Vec::new();

        let mut sharing_level = app.sharing_level;
        if is_path_app && !self.policy.allow_path_app_sharing {
            if app.sharing_level != SharingLevel::Owner {
                warnings.push(format!(
                    "unable to use configured sharing level \"{}\" because path-based app \
                     sharing is disabled (see --dangerous-allow-path-app-sharing), using \
                     sharing level \"owner\" instead",
                    app.sharing_level
                ));
            }
            sharing_level = SharingLevel::Owner;
        }

        let Some(subject) = subject else {
            return Ok(AuthzOutcome {
                allowed: sharing_level == SharingLevel::Public,
                warnings,
            });
        };

        if is_path_app
            && sharing_level == SharingLevel::Owner
            && app.workspace.owner_id != subject.user_id
            && !self.policy.allow_path_app_site_owner_access
        {
            if subject.is_site_owner() {
                warnings.push(
                    "path-based apps with \"owner\" share level are only accessible by the \
                     workspace owner (see --dangerous-allow-path-app-site-owner-access)"
                        .to_string(),
                );
            }
            return Ok(AuthzOutcome::deny(warnings));
        }

        let action = if access_method == AccessMethod::Terminal {
            RbacAction::Ssh
        } else {
            RbacAction::ApplicationConnect
        };
        let object = RbacObject::workspace(app.workspace.id, app.workspace.owner_id);
        if self.check(subject, action, &object).await? {
            return Ok(AuthzOutcome::allow());
        }

        match sharing_level {
            SharingLevel::Owner => {}
            SharingLevel::Authenticated => {
                let own = RbacObject::owned_by(subject.user_id);
                if self.check(subject, action, &own).await? {
                    return Ok(AuthzOutcome::allow());
                }
            }
            SharingLevel::Public => return Ok(AuthzOutcome::allow()),
        }

        Ok(AuthzOutcome::deny(warnings))
    }

    /// Runs one RBAC check, mapping a denial to `false`.
    async fn check(
        &self,
        subject: &Subject,
        action: RbacAction,
        object: &RbacObject,
    ) -> Result<bool, AuthorizeError> {
        match self.rbac.authorize(subject, action, object).await {
            Ok(()) => Ok(true),
            Err(AuthorizeError::Forbidden) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
