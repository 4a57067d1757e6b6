//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::BackendKind;
use crate::security::Tenant;

/// Root configuration for the authenticating gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Log level used when RUST_LOG is not set.
    pub log_level: String,

    /// Authenticated listener (proxied API traffic).
    pub server: ListenerConfig,

    /// Unauthenticated listener (readiness, metrics, profiling).
    pub admin: ListenerConfig,

    /// Tenants allowed through the authenticated listener, tried in order.
    pub tenants: Vec<Tenant>,

    /// Distributor upstream (remote write).
    pub distributor: UpstreamConfig,

    /// Query-frontend upstream (PromQL read path).
    pub frontend: UpstreamConfig,

    /// Alertmanager upstream.
    pub alertmanager: UpstreamConfig,

    /// Ruler upstream.
    pub ruler: UpstreamConfig,
}

impl GatewayConfig {
    /// Upstream configuration for the given backend kind.
    pub fn upstream(&self, kind: BackendKind) -> &UpstreamConfig {
        match kind {
            BackendKind::Distributor => &self.distributor,
            BackendKind::QueryFrontend => &self.frontend,
            BackendKind::Alertmanager => &self.alertmanager,
            BackendKind::Ruler => &self.ruler,
        }
    }

    /// Log level, falling back to `info` when unset.
    pub fn log_level(&self) -> &str {
        if self.log_level.is_empty() {
            "info"
        } else {
            &self.log_level
        }
    }
}

/// Listener configuration.
///
/// A port of `0` means "probe the listener's default port".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0").
    pub address: String,

    /// Bind port.
    pub port: u16,

    /// Time allowed to read the request headers, in seconds.
    pub read_timeout_secs: u64,

    /// Time allowed to produce a response, in seconds.
    pub write_timeout_secs: u64,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Grace period for draining in-flight requests on shutdown, in seconds.
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 0,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            max_connections: 10_000,
            graceful_shutdown_timeout_secs: 30,
        }
    }
}

/// Configuration for one backend kind.
///
/// Every timeout is in seconds; `0` selects the backend kind's default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the backend. Empty disables the backend.
    pub url: String,

    /// Path overrides. Empty falls back to the backend kind's default list.
    pub paths: Vec<String>,

    /// Overall bound on one forwarded request.
    pub http_client_timeout_secs: u64,

    /// TCP connect timeout.
    pub http_client_dialer_timeout_secs: u64,

    /// TLS handshake timeout (https upstreams only).
    pub http_client_tls_handshake_timeout_secs: u64,

    /// Time to wait for response headers.
    pub http_client_response_header_timeout_secs: u64,

    /// Interval between DNS re-resolutions of the upstream host.
    pub dns_refresh_interval_secs: u64,
}

impl UpstreamConfig {
    /// Whether a URL is configured for this backend.
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}
