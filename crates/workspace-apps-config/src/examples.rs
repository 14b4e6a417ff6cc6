// crates/workspace-apps-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payloads.
// Purpose: Deterministic examples for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical examples for workspace apps configuration. The control plane
//! example validates as-is; the proxy example shows the delegating mode.

/// Returns a canonical example `workspace-apps.toml` for a control plane.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "0.0.0.0:3000"
access_url = "https://dev.example.com"
app_hostname = "*.apps.example.com"
trusted_proxy_hosts = ["eu.proxy.example.com"]
trusted_proxy_app_hostnames = ["*.eu-apps.example.com"]
secure_auth_cookie = true
session_duration_ms = 86400000
proxy_tokens = ["replace-with-a-long-random-proxy-token"]

[apps]
token_lifetime_ms = 60000
agent_inactive_timeout_ms = 60000
dangerous_allow_path_app_sharing = false
dangerous_allow_path_app_site_owner_access = false

[stats]
report_interval_ms = 30000
rollup_window_ms = 60000

[keys]
signing_key_id = "signing-2024-05"
signing_secret = "c2lnbmluZy1zZWNyZXQtZm9yLWV4YW1wbGUtb25seS0wMTIzNDU2Nzg5YWJjZGVm"
encryption_key_id = "encryption-2024-05"
encryption_secret = "ZW5jcnlwdGlvbi1rZXktZXhhbXBsZS0zMmJ5dGVzISE="
"#,
    )
}

/// Returns an example `workspace-apps.toml` for a proxy deployment.
#[must_use]
pub fn proxy_config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "0.0.0.0:3001"
access_url = "https://eu.proxy.example.com"
app_hostname = "*.eu-apps.example.com"
secure_auth_cookie = true

[proxy]
primary_access_url = "https://dev.example.com"
proxy_token = "replace-with-a-long-random-proxy-token"
"#,
    )
}
