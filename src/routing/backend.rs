//! Backend kinds and their built-in defaults.
//!
//! Each kind carries two tables: the timeouts used whenever the operator
//! leaves a field at zero, and the API paths registered when no path
//! override is configured. The path lists keep every historical alias
//! (`/api/prom/...` next to `/prometheus/...`).

use std::fmt;
use std::time::Duration;

use crate::config::UpstreamConfig;

/// Category of upstream service behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Distributor,
    QueryFrontend,
    Alertmanager,
    Ruler,
}

const DISTRIBUTOR_PATHS: &[&str] = &["/api/v1/push", "/api/prom/push"];

const QUERY_FRONTEND_PATHS: &[&str] = &[
    "/prometheus/api/v1/query",
    "/api/prom/api/v1/query",
    "/prometheus/api/v1/query_range",
    "/api/prom/api/v1/query_range",
    "/prometheus/api/v1/query_exemplars",
    "/api/prom/api/v1/query_exemplars",
    "/prometheus/api/v1/series",
    "/api/prom/api/v1/series",
    "/prometheus/api/v1/labels",
    "/api/prom/api/v1/labels",
    "/prometheus/api/v1/label/",
    "/api/prom/api/v1/label/",
    "/prometheus/api/v1/metadata",
    "/api/prom/api/v1/metadata",
    "/prometheus/api/v1/read",
    "/api/prom/api/v1/read",
    "/prometheus/api/v1/status/buildinfo",
    "/api/prom/api/v1/status/buildinfo",
];

const ALERTMANAGER_PATHS: &[&str] = &[
    "/alertmanager/",
    "/api/v1/alerts",
    "/multitenant_alertmanager/delete_tenant_config",
];

const RULER_PATHS: &[&str] = &[
    "/prometheus/api/v1/rules",
    "/api/prom/api/v1/rules",
    "/prometheus/api/v1/alerts",
    "/api/prom/api/v1/alerts",
    "/api/v1/rules",
    "/api/v1/rules/",
    "/api/prom/rules",
    "/api/prom/rules/",
    "/ruler/delete_tenant_config",
];

impl BackendKind {
    /// Every kind, in registration order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Distributor,
        BackendKind::QueryFrontend,
        BackendKind::Alertmanager,
        BackendKind::Ruler,
    ];

    /// Name used in logs and as the config table key.
    pub fn config_key(&self) -> &'static str {
        match self {
            BackendKind::Distributor => "distributor",
            BackendKind::QueryFrontend => "frontend",
            BackendKind::Alertmanager => "alertmanager",
            BackendKind::Ruler => "ruler",
        }
    }

    /// Paths registered when the upstream has no path override.
    pub fn default_paths(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Distributor => DISTRIBUTOR_PATHS,
            BackendKind::QueryFrontend => QUERY_FRONTEND_PATHS,
            BackendKind::Alertmanager => ALERTMANAGER_PATHS,
            BackendKind::Ruler => RULER_PATHS,
        }
    }

    /// Built-in timeouts for this kind.
    pub fn default_timeouts(&self) -> UpstreamTimeouts {
        let client = match self {
            BackendKind::QueryFrontend => Duration::from_secs(60),
            _ => Duration::from_secs(15),
        };
        UpstreamTimeouts {
            client,
            dial: Duration::from_secs(5),
            tls_handshake: Duration::from_secs(5),
            response_header: Duration::from_secs(5),
            dns_refresh: Duration::from_secs(1),
        }
    }

    /// Paths to register for an upstream: overrides win outright, defaults otherwise.
    pub fn paths_for(&self, upstream: &UpstreamConfig) -> Vec<String> {
        if upstream.paths.is_empty() {
            self.default_paths().iter().map(|p| p.to_string()).collect()
        } else {
            upstream.paths.clone()
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Timeouts of one upstream with every default filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    /// Bound on a whole forwarded request.
    pub client: Duration,
    pub dial: Duration,
    pub tls_handshake: Duration,
    pub response_header: Duration,
    pub dns_refresh: Duration,
}

impl UpstreamTimeouts {
    /// Merge configured values over the kind's defaults, field by field.
    pub fn resolve(upstream: &UpstreamConfig, kind: BackendKind) -> Self {
        let defaults = kind.default_timeouts();
        let pick = |secs: u64, default: Duration| {
            if secs == 0 {
                default
            } else {
                Duration::from_secs(secs)
            }
        };

        Self {
            client: pick(upstream.http_client_timeout_secs, defaults.client),
            dial: pick(upstream.http_client_dialer_timeout_secs, defaults.dial),
            tls_handshake: pick(upstream.http_client_tls_handshake_timeout_secs, defaults.tls_handshake),
            response_header: pick(
                upstream.http_client_response_header_timeout_secs,
                defaults.response_header,
            ),
            dns_refresh: pick(upstream.dns_refresh_interval_secs, defaults.dns_refresh),
        }
    }
}
