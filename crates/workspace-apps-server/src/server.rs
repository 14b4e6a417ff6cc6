// crates/workspace-apps-server/src/server.rs
// ============================================================================
// Module: Workspace Apps Server
// Description: Assemble authorities, stats, and routes from configuration.
// Purpose: Run the app gate as a control plane or as a proxy host.
// Dependencies: axum, tokio, thiserror, workspace-apps-config, workspace-apps-core
// ============================================================================

//! ## Overview
//! [`AppsServer::from_config`] picks the token provider for the deployment
//! mode: a [`DirectTokenAuthority`] over the configured store on the control
//! plane, or a [`DelegatingTokenAuthority`] talking to the primary when a
//! `[proxy]` section is present. The stats collector reports to the store
//! (control plane) or uploads to the primary (proxy). [`AppsServer::serve`]
//! binds the listener and stops on Ctrl-C after a final stats flush.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use workspace_apps_config::ConfigError;
use workspace_apps_config::WorkspaceAppsConfig;
use workspace_apps_core::ApiKeyStore;
use workspace_apps_core::AppStore;
use workspace_apps_core::Authorizer;
use workspace_apps_core::Clock;
use workspace_apps_core::EncryptionKeycache;
use workspace_apps_core::InMemoryAppStore;
use workspace_apps_core::InMemoryStatsReporter;
use workspace_apps_core::RoleAuthorizer;
use workspace_apps_core::SigningKeycache;
use workspace_apps_core::StaticKeycache;
use workspace_apps_core::StatsReporter;
use workspace_apps_core::SystemClock;

use crate::audit::AppAuditSink;
use crate::audit::TracingAppAuditSink;
use crate::client::PrimaryClient;
use crate::delegating::DelegatingTokenAuthority;
use crate::delegating::ProxyStatsReporter;
use crate::direct::DirectAuthoritySettings;
use crate::direct::DirectTokenAuthority;
use crate::forward::AppForwarder;
use crate::forward::EchoForwarder;
use crate::handoff::HandoffIssuer;
use crate::handoff::HandoffRedeemer;
use crate::handoff::HandoffSettings;
use crate::provider::SignedTokenProvider;
use crate::provider::TokenCookieSettings;
use crate::routes::ControlPlaneRoutes;
use crate::routes::RouteContext;
use crate::routes::router;
use crate::stats::StatsCollector;
use crate::stats::StatsCollectorOptions;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Connect timeout for calls to the primary control plane.
const PRIMARY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Overall timeout for calls to the primary control plane.
const PRIMARY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// External systems the server is wired to.
#[derive(Clone)]
pub struct Collaborators {
    /// Platform records.
    pub store: Arc<dyn AppStore>,
    /// API key records.
    pub api_keys: Arc<dyn ApiKeyStore>,
    /// RBAC backend.
    pub rbac: Arc<dyn Authorizer>,
    /// Token signing keys.
    pub signing: Arc<dyn SigningKeycache>,
    /// Handoff encryption keys.
    pub encryption: Arc<dyn EncryptionKeycache>,
    /// Stats destination on the control plane.
    pub reporter: Arc<dyn StatsReporter>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Access decision audit sink.
    pub audit: Arc<dyn AppAuditSink>,
    /// Upstream forwarding.
    pub forwarder: Arc<dyn AppForwarder>,
}

impl Collaborators {
    /// Single-node wiring over an in-memory store and static keys.
    #[must_use]
    pub fn in_memory(store: InMemoryAppStore, keycache: StaticKeycache) -> Self {
        let store = Arc::new(store);
        let keycache = Arc::new(keycache);
        Self {
            store: Arc::clone(&store) as Arc<dyn AppStore>,
            api_keys: store,
            rbac: Arc::new(RoleAuthorizer),
            signing: Arc::clone(&keycache) as Arc<dyn SigningKeycache>,
            encryption: keycache,
            reporter: Arc::new(InMemoryStatsReporter::new()),
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAppAuditSink),
            forwarder: Arc::new(EchoForwarder),
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Configured app gate ready to serve.
pub struct AppsServer {
    /// Listen address.
    bind: SocketAddr,
    /// Host-dispatching router.
    router: Router,
    /// Stats collector, closed on shutdown.
    stats: Arc<StatsCollector>,
}

impl AppsServer {
    /// Builds the server for `config`. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the config is invalid or the primary
    /// client cannot be built.
    pub fn from_config(config: &WorkspaceAppsConfig, collaborators: Collaborators) -> Result<Self, ServerError> {
        config.validate()?;
        let server = &config.server;
        let bind = server.bind_addr()?;
        let access_url = server.access_url()?;
        let app_hostname = server.app_hostname_pattern()?;
        let cookie = TokenCookieSettings {
            secure: server.secure_auth_cookie,
            token_lifetime: config.apps.token_lifetime(),
        };

        let (provider, reporter, control_plane) = match &config.proxy {
            Some(proxy) => {
                let primary = proxy.primary_access_url()?;
                let client =
                    PrimaryClient::new(&primary, &proxy.proxy_token, PRIMARY_CONNECT_TIMEOUT, PRIMARY_REQUEST_TIMEOUT)
                        .map_err(|err| ServerError::Init(err.to_string()))?;
                let provider: Arc<dyn SignedTokenProvider> = Arc::new(DelegatingTokenAuthority::new(
                    client.clone(),
                    Arc::clone(&collaborators.signing),
                    Arc::clone(&collaborators.clock),
                ));
                let reporter: Arc<dyn StatsReporter> = Arc::new(ProxyStatsReporter::new(client));
                tracing::info!(primary = %primary, "running as a workspace proxy");
                (provider, reporter, None)
            }
            None => {
                let direct = Arc::new(DirectTokenAuthority::new(
                    &collaborators,
                    DirectAuthoritySettings {
                        dashboard_url: access_url.clone(),
                        token_lifetime: config.apps.token_lifetime(),
                        agent_inactive_timeout: config.apps.agent_inactive_timeout(),
                        policy: config.apps.access_policy(),
                    },
                ));
                let handoff = HandoffIssuer::new(
                    &collaborators,
                    HandoffSettings {
                        dashboard_url: access_url.clone(),
                        app_hostname: app_hostname.clone(),
                        trusted_proxy_app_hostnames: server.trusted_proxy_app_patterns()?,
                        trusted_proxy_hosts: server.trusted_proxy_hosts.clone(),
                        session_duration: server.session_duration(),
                    },
                );
                let provider = Arc::clone(&direct) as Arc<dyn SignedTokenProvider>;
                let control_plane = ControlPlaneRoutes {
                    handoff,
                    direct,
                    reporter: Arc::clone(&collaborators.reporter),
                    proxy_tokens: server.proxy_tokens.clone(),
                };
                (provider, Arc::clone(&collaborators.reporter), Some(control_plane))
            }
        };

        let stats = Arc::new(StatsCollector::start(StatsCollectorOptions {
            reporter,
            clock: Arc::clone(&collaborators.clock),
            report_interval: config.stats.report_interval(),
            rollup_window: config.stats.rollup_window(),
        }));
        let router = router(RouteContext {
            provider,
            stats: Arc::clone(&stats),
            forwarder: Arc::clone(&collaborators.forwarder),
            redeemer: HandoffRedeemer::new(
                Arc::clone(&collaborators.encryption),
                Arc::clone(&collaborators.clock),
                app_hostname.clone(),
                server.secure_auth_cookie,
            ),
            control_plane,
            access_url,
            app_hostname,
            cookie,
            clock: Arc::clone(&collaborators.clock),
        });
        Ok(Self {
            bind,
            router,
            stats,
        })
    }

    /// Returns the configured listen address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Returns a clone of the router, for in-process callers and tests.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Returns the stats collector.
    #[must_use]
    pub fn stats(&self) -> Arc<StatsCollector> {
        Arc::clone(&self.stats)
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener =
            TcpListener::bind(self.bind).await.map_err(|err| ServerError::Transport(err.to_string()))?;
        self.serve_with_shutdown(listener, ctrl_c()).await
    }

    /// Serves on `listener` until `shutdown` resolves, then flushes stats.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when serving fails.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr().map_err(|err| ServerError::Transport(err.to_string()))?;
        tracing::info!(%addr, "workspace apps server listening");
        let served = axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await;
        if let Err(err) = self.stats.close().await {
            tracing::error!(error = %err, "could not close app stats collector");
        }
        served.map_err(|err| ServerError::Transport(err.to_string()))
    }
}

/// Resolves on Ctrl-C; never resolves when the handler cannot be installed.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server assembly and runtime failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration rejected.
    #[error("config error: {0}")]
    Config(String),
    /// A collaborator could not be initialized.
    #[error("init error: {0}")]
    Init(String),
    /// Listener or connection failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
