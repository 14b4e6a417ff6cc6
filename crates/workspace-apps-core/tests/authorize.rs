// crates/workspace-apps-core/tests/authorize.rs
// ============================================================================
// Module: Authorization Tests
// Description: Sharing level decisions for path, subdomain, and terminal apps.
// Purpose: Lock down who may reach which app and which warnings explain it.
// Dependencies: workspace-apps-core, tokio
// ============================================================================

//! App authorization decision tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap for clarity."
)]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use workspace_apps_core::ApiKeyScope;
use workspace_apps_core::AppAccessPolicy;
use workspace_apps_core::AppAuthorizer;
use workspace_apps_core::AppResolver;
use workspace_apps_core::ApplicationUrl;
use workspace_apps_core::AuthorizeError;
use workspace_apps_core::Authorizer;
use workspace_apps_core::RbacAction;
use workspace_apps_core::RbacObject;
use workspace_apps_core::Request;
use workspace_apps_core::ResolvedApp;
use workspace_apps_core::RoleAuthorizer;
use workspace_apps_core::Subject;
use workspace_apps_core::User;

use crate::common::World;
use crate::common::world;

fn subject(user: &User) -> Subject {
    Subject {
        user_id: user.id,
        roles: user.roles.clone(),
        scope: ApiKeyScope::All,
    }
}

async fn resolve(world: &World, request: Request) -> ResolvedApp {
    AppResolver::new(world.store_arc()).resolve(&request.normalize()).await.unwrap()
}

fn path(slug: &str) -> Request {
    Request::path_app(format!("/@alice/dev/apps/{slug}"), "alice", "dev", slug)
}

fn subdomain(slug: &str) -> Request {
    Request::subdomain_app(&ApplicationUrl {
        prefix: String::new(),
        app_slug_or_port: slug.to_string(),
        agent_name: String::new(),
        workspace_name: "dev".to_string(),
        username: "alice".to_string(),
    })
}

fn authorizer(policy: AppAccessPolicy) -> AppAuthorizer {
    AppAuthorizer::new(Arc::new(RoleAuthorizer), policy)
}

#[tokio::test]
async fn owner_reaches_own_apps() {
    let world = world();
    let app = resolve(&world, path("code")).await;
    let outcome =
        authorizer(AppAccessPolicy::default()).authorize(Some(&subject(&world.owner)), &app).await.unwrap();
    assert!(outcome.allowed);
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn anonymous_reaches_only_public_subdomain_apps() {
    let world = world();
    let authz = authorizer(AppAccessPolicy::default());

    let public = resolve(&world, subdomain("site")).await;
    assert!(authz.authorize(None, &public).await.unwrap().allowed);

    let authenticated = resolve(&world, subdomain("shared")).await;
    assert!(!authz.authorize(None, &authenticated).await.unwrap().allowed);

    let owner = resolve(&world, subdomain("code")).await;
    assert!(!authz.authorize(None, &owner).await.unwrap().allowed);
}

#[tokio::test]
async fn authenticated_subdomain_app_is_open_to_other_users() {
    let world = world();
    let authz = authorizer(AppAccessPolicy::default());
    let bob = subject(&world.other);

    let shared = resolve(&world, subdomain("shared")).await;
    assert!(authz.authorize(Some(&bob), &shared).await.unwrap().allowed);

    let private = resolve(&world, subdomain("code")).await;
    assert!(!authz.authorize(Some(&bob), &private).await.unwrap().allowed);
}

#[tokio::test]
async fn path_app_sharing_is_disabled_by_default() {
    let world = world();
    let authz = authorizer(AppAccessPolicy::default());
    let app = resolve(&world, path("site")).await;

    let anonymous = authz.authorize(None, &app).await.unwrap();
    assert!(!anonymous.allowed);
    assert_eq!(anonymous.warnings.len(), 1);
    assert!(anonymous.warnings[0].contains("sharing level \"public\""));
    assert!(anonymous.warnings[0].contains("--dangerous-allow-path-app-sharing"));

    let bob = authz.authorize(Some(&subject(&world.other)), &app).await.unwrap();
    assert!(!bob.allowed);
}

#[tokio::test]
async fn path_app_sharing_flag_honors_levels() {
    let world = world();
    let authz = authorizer(AppAccessPolicy {
        allow_path_app_sharing: true,
        allow_path_app_site_owner_access: false,
    });
    let app = resolve(&world, path("site")).await;
    let outcome = authz.authorize(None, &app).await.unwrap();
    assert!(outcome.allowed);
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn site_owner_blocked_from_owner_path_apps_with_warning() {
    let world = world();
    let app = resolve(&world, path("code")).await;
    let admin = subject(&world.site_admin);

    let outcome = authorizer(AppAccessPolicy::default()).authorize(Some(&admin), &app).await.unwrap();
    assert!(!outcome.allowed);
    assert!(outcome.warnings.iter().any(|w| w.contains("--dangerous-allow-path-app-site-owner-access")));

    let lenient = authorizer(AppAccessPolicy {
        allow_path_app_sharing: false,
        allow_path_app_site_owner_access: true,
    });
    assert!(lenient.authorize(Some(&admin), &app).await.unwrap().allowed);
}

#[tokio::test]
async fn site_owner_reaches_owner_subdomain_apps() {
    let world = world();
    let app = resolve(&world, subdomain("code")).await;
    let outcome = authorizer(AppAccessPolicy::default())
        .authorize(Some(&subject(&world.site_admin)), &app)
        .await
        .unwrap();
    assert!(outcome.allowed);
}

#[tokio::test]
async fn terminal_requires_ssh_permission() {
    let world = world();
    let request = Request::terminal(
        format!("/api/v2/workspaceagents/{}/pty", world.agent.id),
        world.agent.id.to_string(),
    );
    let app = resolve(&world, request).await;
    let authz = authorizer(AppAccessPolicy::default());

    assert!(authz.authorize(Some(&subject(&world.owner)), &app).await.unwrap().allowed);
    assert!(!authz.authorize(Some(&subject(&world.other)), &app).await.unwrap().allowed);

    let scoped = Subject {
        scope: ApiKeyScope::ApplicationConnect,
        ..subject(&world.owner)
    };
    assert!(!authz.authorize(Some(&scoped), &app).await.unwrap().allowed);
}

struct BrokenRbac;

#[async_trait]
impl Authorizer for BrokenRbac {
    async fn authorize(
        &self,
        _subject: &Subject,
        _action: RbacAction,
        _object: &RbacObject,
    ) -> Result<(), AuthorizeError> {
        Err(AuthorizeError::Backend("policy engine offline".to_string()))
    }
}

#[tokio::test]
async fn rbac_backend_failure_is_an_error() {
    let world = world();
    let app = resolve(&world, subdomain("code")).await;
    let authz = AppAuthorizer::new(Arc::new(BrokenRbac), AppAccessPolicy::default());
    let err = authz.authorize(Some(&subject(&world.owner)), &app).await.unwrap_err();
    assert_eq!(err, AuthorizeError::Backend("policy engine offline".to_string()));

    // Anonymous decisions never consult RBAC.
    let public = resolve(&world, subdomain("site")).await;
    assert!(authz.authorize(None, &public).await.unwrap().allowed);
}
