// crates/workspace-apps-config/src/config.rs
// ============================================================================
// Module: Workspace Apps Configuration
// Description: Configuration loading and validation for the app gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: workspace-apps-core, serde, toml, url, base64
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults so an empty file yields a runnable single-node
//! control plane on loopback. Missing or invalid values fail closed.
//!
//! Durations are configured in milliseconds and exposed through typed
//! accessors ([`AppsConfig::token_lifetime`], [`StatsConfig::report_interval`],
//! and friends) so callers never convert units by hand.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use workspace_apps_core::AppAccessPolicy;
use workspace_apps_core::EncryptionKey;
use workspace_apps_core::HostnamePattern;
use workspace_apps_core::SigningKey;
use workspace_apps_core::StaticKeycache;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "workspace-apps.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "WORKSPACE_APPS_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of accepted proxy tokens.
pub(crate) const MAX_PROXY_TOKENS: usize = 64;
/// Maximum length of a proxy token.
pub(crate) const MAX_PROXY_TOKEN_LENGTH: usize = 256;
/// Maximum number of trusted proxy hosts or hostname patterns.
pub(crate) const MAX_TRUSTED_PROXY_ENTRIES: usize = 256;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:3000";
/// Default dashboard URL.
const DEFAULT_ACCESS_URL: &str = "http://127.0.0.1:3000";
/// Default dashboard session duration (24 hours).
const DEFAULT_SESSION_DURATION_MS: u64 = 24 * 60 * 60 * 1000;
/// Minimum dashboard session duration (1 minute).
pub(crate) const MIN_SESSION_DURATION_MS: u64 = 60 * 1000;
/// Default signed token lifetime (1 minute).
const DEFAULT_TOKEN_LIFETIME_MS: u64 = 60 * 1000;
/// Minimum signed token lifetime (1 second).
pub(crate) const MIN_TOKEN_LIFETIME_MS: u64 = 1000;
/// Maximum signed token lifetime (1 hour).
pub(crate) const MAX_TOKEN_LIFETIME_MS: u64 = 60 * 60 * 1000;
/// Default agent inactivity timeout (1 minute).
const DEFAULT_AGENT_INACTIVE_TIMEOUT_MS: u64 = 60 * 1000;
/// Default stats report interval (30 seconds).
const DEFAULT_REPORT_INTERVAL_MS: u64 = 30 * 1000;
/// Default stats rollup window (1 minute).
const DEFAULT_ROLLUP_WINDOW_MS: u64 = 60 * 1000;
/// Minimum for every interval-style setting (1 second).
pub(crate) const MIN_INTERVAL_MS: u64 = 1000;
/// Maximum for stats intervals (1 hour).
pub(crate) const MAX_STATS_INTERVAL_MS: u64 = 60 * 60 * 1000;
/// Minimum signing secret length in bytes.
pub(crate) const MIN_SIGNING_SECRET_BYTES: usize = 32;
/// Required encryption secret length in bytes.
pub(crate) const ENCRYPTION_SECRET_BYTES: usize = 32;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Workspace apps gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceAppsConfig {
    /// HTTP server and dashboard settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// App access and token settings.
    #[serde(default)]
    pub apps: AppsConfig,
    /// Usage statistics settings.
    #[serde(default)]
    pub stats: StatsConfig,
    /// Static key material (random keys when absent).
    #[serde(default)]
    pub keys: KeysConfig,
    /// Proxy mode: delegate issuance to a primary control plane.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl WorkspaceAppsConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config = Self::from_toml(content)?;
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.apps.validate()?;
        self.stats.validate()?;
        self.keys.validate()?;
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
            if proxy.primary_access_url()? == self.server.access_url()? {
                return Err(ConfigError::Invalid(
                    "proxy.primary_access_url must differ from server.access_url".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns true when issuance is delegated to a primary control plane.
    #[must_use]
    pub const fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Builds the keycache from static keys, or generates random keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configured secrets do not decode.
    pub fn keycache(&self) -> Result<StaticKeycache, ConfigError> {
        self.keys.keycache()
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server and dashboard settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public dashboard URL; path apps and login redirects are built on it.
    #[serde(default = "default_access_url")]
    pub access_url: String,
    /// Wildcard hostname for subdomain apps, e.g. `*.apps.example.com`.
    #[serde(default)]
    pub app_hostname: Option<String>,
    /// Hosts of trusted proxies allowed as auth-redirect destinations.
    #[serde(default)]
    pub trusted_proxy_hosts: Vec<String>,
    /// Wildcard app hostnames served by trusted proxies.
    #[serde(default)]
    pub trusted_proxy_app_hostnames: Vec<String>,
    /// Mark app cookies `Secure`.
    #[serde(default)]
    pub secure_auth_cookie: bool,
    /// Dashboard session duration; caps handed-off API key lifetimes.
    #[serde(default = "default_session_duration_ms")]
    pub session_duration_ms: u64,
    /// Tokens accepted from proxies on the control-plane proxy endpoints.
    #[serde(default)]
    pub proxy_tokens: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            access_url: default_access_url(),
            app_hostname: None,
            trusted_proxy_hosts: Vec::new(),
            trusted_proxy_app_hostnames: Vec::new(),
            secure_auth_cookie: false,
            session_duration_ms: default_session_duration_ms(),
            proxy_tokens: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.access_url()?;
        self.app_hostname_pattern()?;
        if self.trusted_proxy_hosts.len() > MAX_TRUSTED_PROXY_ENTRIES {
            return Err(ConfigError::Invalid(
                "server.trusted_proxy_hosts exceeds max entries".to_string(),
            ));
        }
        for host in &self.trusted_proxy_hosts {
            let trimmed = host.trim();
            if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains('*') {
                return Err(ConfigError::Invalid(format!(
                    "server.trusted_proxy_hosts entry \"{host}\" must be a bare host"
                )));
            }
        }
        self.trusted_proxy_app_patterns()?;
        if self.session_duration_ms < MIN_SESSION_DURATION_MS {
            return Err(ConfigError::Invalid(format!(
                "server.session_duration_ms must be at least {MIN_SESSION_DURATION_MS}"
            )));
        }
        if self.proxy_tokens.len() > MAX_PROXY_TOKENS {
            return Err(ConfigError::Invalid("server.proxy_tokens exceeds max entries".to_string()));
        }
        for token in &self.proxy_tokens {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "server.proxy_tokens entries must be non-empty".to_string(),
                ));
            }
            if token.len() > MAX_PROXY_TOKEN_LENGTH {
                return Err(ConfigError::Invalid(
                    "server.proxy_tokens entry exceeds max length".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid server.bind: {}", self.bind)))
    }

    /// Parses the dashboard URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is not an absolute http(s) URL.
    pub fn access_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("server.access_url", &self.access_url)
    }

    /// Parses the subdomain app hostname pattern, when configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the pattern is malformed.
    pub fn app_hostname_pattern(&self) -> Result<Option<HostnamePattern>, ConfigError> {
        self.app_hostname
            .as_deref()
            .map(|pattern| parse_pattern("server.app_hostname", pattern))
            .transpose()
    }

    /// Parses the trusted proxy app hostname patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a pattern is malformed.
    pub fn trusted_proxy_app_patterns(&self) -> Result<Vec<HostnamePattern>, ConfigError> {
        if self.trusted_proxy_app_hostnames.len() > MAX_TRUSTED_PROXY_ENTRIES {
            return Err(ConfigError::Invalid(
                "server.trusted_proxy_app_hostnames exceeds max entries".to_string(),
            ));
        }
        self.trusted_proxy_app_hostnames
            .iter()
            .map(|pattern| parse_pattern("server.trusted_proxy_app_hostnames", pattern))
            .collect()
    }

    /// Returns the dashboard session duration.
    #[must_use]
    pub fn session_duration(&self) -> time::Duration {
        millis(self.session_duration_ms)
    }
}

// ============================================================================
// SECTION: Apps
// ============================================================================

/// App access and token settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppsConfig {
    /// Signed app token lifetime.
    #[serde(default = "default_token_lifetime_ms")]
    pub token_lifetime_ms: u64,
    /// Agents silent for longer than this are treated as disconnected.
    #[serde(default = "default_agent_inactive_timeout_ms")]
    pub agent_inactive_timeout_ms: u64,
    /// Honor non-owner sharing levels on path apps.
    #[serde(default)]
    pub dangerous_allow_path_app_sharing: bool,
    /// Let site owners open other users' owner-level path apps.
    #[serde(default)]
    pub dangerous_allow_path_app_site_owner_access: bool,
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            token_lifetime_ms: default_token_lifetime_ms(),
            agent_inactive_timeout_ms: default_agent_inactive_timeout_ms(),
            dangerous_allow_path_app_sharing: false,
            dangerous_allow_path_app_site_owner_access: false,
        }
    }
}

impl AppsConfig {
    /// Validates app settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TOKEN_LIFETIME_MS..=MAX_TOKEN_LIFETIME_MS).contains(&self.token_lifetime_ms) {
            return Err(ConfigError::Invalid(format!(
                "apps.token_lifetime_ms must be between {MIN_TOKEN_LIFETIME_MS} and \
                 {MAX_TOKEN_LIFETIME_MS}"
            )));
        }
        if self.agent_inactive_timeout_ms < MIN_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "apps.agent_inactive_timeout_ms must be at least {MIN_INTERVAL_MS}"
            )));
        }
        Ok(())
    }

    /// Returns the signed token lifetime.
    #[must_use]
    pub fn token_lifetime(&self) -> time::Duration {
        millis(self.token_lifetime_ms)
    }

    /// Returns the agent inactivity timeout.
    #[must_use]
    pub fn agent_inactive_timeout(&self) -> time::Duration {
        millis(self.agent_inactive_timeout_ms)
    }

    /// Returns the deployment access policy.
    #[must_use]
    pub const fn access_policy(&self) -> AppAccessPolicy {
        AppAccessPolicy {
            allow_path_app_sharing: self.dangerous_allow_path_app_sharing,
            allow_path_app_site_owner_access: self.dangerous_allow_path_app_site_owner_access,
        }
    }
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Usage statistics settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    /// Period between flushes.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Sessions at most this long are rolled up into one record.
    #[serde(default = "default_rollup_window_ms")]
    pub rollup_window_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: default_report_interval_ms(),
            rollup_window_ms: default_rollup_window_ms(),
        }
    }
}

impl StatsConfig {
    /// Validates stats settings.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("stats.report_interval_ms", self.report_interval_ms),
            ("stats.rollup_window_ms", self.rollup_window_ms),
        ] {
            if !(MIN_INTERVAL_MS..=MAX_STATS_INTERVAL_MS).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be between {MIN_INTERVAL_MS} and {MAX_STATS_INTERVAL_MS}"
                )));
            }
        }
        Ok(())
    }

    /// Returns the flush period.
    #[must_use]
    pub const fn report_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.report_interval_ms)
    }

    /// Returns the rollup window.
    #[must_use]
    pub fn rollup_window(&self) -> time::Duration {
        millis(self.rollup_window_ms)
    }
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Static key material. Each key is configured as an ID plus base64 secret.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeysConfig {
    /// Signing key identifier.
    #[serde(default)]
    pub signing_key_id: Option<String>,
    /// Base64 HMAC secret, at least 32 bytes decoded.
    #[serde(default)]
    pub signing_secret: Option<String>,
    /// Encryption key identifier.
    #[serde(default)]
    pub encryption_key_id: Option<String>,
    /// Base64 AES-256 key, exactly 32 bytes decoded.
    #[serde(default)]
    pub encryption_secret: Option<String>,
}

impl KeysConfig {
    /// Validates key settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.signing_key()?;
        self.encryption_key()?;
        Ok(())
    }

    /// Decodes the static signing key, when configured.
    fn signing_key(&self) -> Result<Option<SigningKey>, ConfigError> {
        let Some((id, secret)) = paired(
            "keys.signing_key_id",
            self.signing_key_id.as_deref(),
            "keys.signing_secret",
            self.signing_secret.as_deref(),
        )?
        else {
            return Ok(None);
        };
        let secret = decode_secret("keys.signing_secret", secret)?;
        if secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "keys.signing_secret must decode to at least {MIN_SIGNING_SECRET_BYTES} bytes"
            )));
        }
        Ok(Some(SigningKey {
            id: id.to_string(),
            secret,
        }))
    }

    /// Decodes the static encryption key, when configured.
    fn encryption_key(&self) -> Result<Option<EncryptionKey>, ConfigError> {
        let Some((id, secret)) = paired(
            "keys.encryption_key_id",
            self.encryption_key_id.as_deref(),
            "keys.encryption_secret",
            self.encryption_secret.as_deref(),
        )?
        else {
            return Ok(None);
        };
        let secret = decode_secret("keys.encryption_secret", secret)?;
        let secret: [u8; ENCRYPTION_SECRET_BYTES] = secret.try_into().map_err(|_| {
            ConfigError::Invalid(format!(
                "keys.encryption_secret must decode to exactly {ENCRYPTION_SECRET_BYTES} bytes"
            ))
        })?;
        Ok(Some(EncryptionKey {
            id: id.to_string(),
            secret,
        }))
    }

    /// Builds a keycache, generating any key that is not configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configured secrets do not decode.
    pub fn keycache(&self) -> Result<StaticKeycache, ConfigError> {
        let generated = StaticKeycache::generate();
        let (default_signing, default_encryption) = generated.active_keys();
        let signing = self.signing_key()?.unwrap_or(default_signing);
        let encryption = self.encryption_key()?.unwrap_or(default_encryption);
        Ok(StaticKeycache::new(signing, encryption))
    }
}

// ============================================================================
// SECTION: Proxy
// ============================================================================

/// Proxy mode settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Primary control plane URL.
    pub primary_access_url: String,
    /// Token presented in the proxy token header.
    pub proxy_token: String,
}

impl ProxyConfig {
    /// Validates proxy settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.primary_access_url()?;
        if self.proxy_token.trim().is_empty() {
            return Err(ConfigError::Invalid("proxy.proxy_token must be non-empty".to_string()));
        }
        if self.proxy_token.len() > MAX_PROXY_TOKEN_LENGTH {
            return Err(ConfigError::Invalid("proxy.proxy_token exceeds max length".to_string()));
        }
        Ok(())
    }

    /// Parses the primary control plane URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is not an absolute http(s) URL.
    pub fn primary_access_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("proxy.primary_access_url", &self.primary_access_url)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default dashboard URL.
fn default_access_url() -> String {
    DEFAULT_ACCESS_URL.to_string()
}

/// Default session duration.
const fn default_session_duration_ms() -> u64 {
    DEFAULT_SESSION_DURATION_MS
}

/// Default token lifetime.
const fn default_token_lifetime_ms() -> u64 {
    DEFAULT_TOKEN_LIFETIME_MS
}

/// Default agent inactivity timeout.
const fn default_agent_inactive_timeout_ms() -> u64 {
    DEFAULT_AGENT_INACTIVE_TIMEOUT_MS
}

/// Default stats report interval.
const fn default_report_interval_ms() -> u64 {
    DEFAULT_REPORT_INTERVAL_MS
}

/// Default stats rollup window.
const fn default_rollup_window_ms() -> u64 {
    DEFAULT_ROLLUP_WINDOW_MS
}

/// Converts milliseconds to a signed duration, saturating.
fn millis(value: u64) -> time::Duration {
    time::Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Parses an absolute http(s) URL with a host.
fn parse_http_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|err| ConfigError::Invalid(format!("invalid {field}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!("{field} must use http or https")));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::Invalid(format!("{field} must include a host")));
    }
    Ok(url)
}

/// Parses a wildcard hostname pattern.
fn parse_pattern(field: &str, value: &str) -> Result<HostnamePattern, ConfigError> {
    HostnamePattern::parse(value.trim())
        .map_err(|err| ConfigError::Invalid(format!("invalid {field} \"{value}\": {err}")))
}

/// Requires an ID and secret to be set together.
fn paired<'a>(
    id_field: &str,
    id: Option<&'a str>,
    secret_field: &str,
    secret: Option<&'a str>,
) -> Result<Option<(&'a str, &'a str)>, ConfigError> {
    match (id, secret) {
        (None, None) => Ok(None),
        (Some(id), Some(secret)) => {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{id_field} must be non-empty")));
            }
            Ok(Some((id, secret)))
        }
        _ => Err(ConfigError::Invalid(format!("{id_field} and {secret_field} must be set together"))),
    }
}

/// Decodes a base64 secret.
fn decode_secret(field: &str, value: &str) -> Result<Vec<u8>, ConfigError> {
    STANDARD
        .decode(value.trim())
        .map_err(|_| ConfigError::Invalid(format!("{field} must be valid base64")))
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
