//! The gateway: one upstream proxy per configured backend kind.
//!
//! # Responsibilities
//! - Build an `UpstreamProxy` for every backend kind that has a URL
//! - Register each proxy on its paths on the authenticated listener
//! - Stop every proxy's DNS refresh loop at shutdown

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    response::Response,
    routing::any,
};
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::http::{ListenerKind, Server, ServerError};
use crate::proxy::{ProxyError, UpstreamProxy};
use crate::routing::BackendKind;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{kind} upstream: {source}")]
    Proxy {
        kind: BackendKind,
        #[source]
        source: ProxyError,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

struct Mount {
    proxy: Arc<UpstreamProxy>,
    paths: Vec<String>,
}

/// Upstream proxies and the paths they serve, in backend-kind order.
pub struct Gateway {
    mounts: Vec<Mount>,
}

impl Gateway {
    /// Build a proxy for every enabled backend kind.
    ///
    /// Any proxy failing to build (bad URL, unresolvable host) aborts the
    /// whole gateway.
    pub async fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut mounts = Vec::new();

        for kind in BackendKind::ALL {
            let upstream = config.upstream(kind);
            if !upstream.is_enabled() {
                tracing::info!(backend = %kind, "Backend disabled, no URL configured");
                continue;
            }

            let proxy = UpstreamProxy::new(upstream.url.trim(), upstream, kind)
                .await
                .map_err(|source| GatewayError::Proxy { kind, source })?;
            mounts.push(Mount {
                proxy: Arc::new(proxy),
                paths: kind.paths_for(upstream),
            });
        }

        Ok(Self { mounts })
    }

    /// Register every proxy on the authenticated listener.
    pub fn register_routes(&self, server: &mut Server) -> Result<(), GatewayError> {
        for Mount { proxy, paths } in &self.mounts {
            for path in paths {
                server.register(
                    ListenerKind::Authenticated,
                    path,
                    any(forward).with_state(Arc::clone(proxy)),
                )?;
            }
            tracing::info!(
                backend = %proxy.kind(),
                target = %proxy.target(),
                routes = paths.len(),
                "Backend routes registered"
            );
        }
        Ok(())
    }

    pub fn proxy(&self, kind: BackendKind) -> Option<&Arc<UpstreamProxy>> {
        self.mounts.iter().map(|m| &m.proxy).find(|p| p.kind() == kind)
    }

    /// Paths a backend kind is served on, if enabled.
    pub fn paths(&self, kind: BackendKind) -> Option<&[String]> {
        self.mounts
            .iter()
            .find(|m| m.proxy.kind() == kind)
            .map(|m| m.paths.as_slice())
    }

    pub fn enabled(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.mounts.iter().map(|m| m.proxy.kind())
    }

    /// Stop every DNS refresh loop. Idempotent.
    pub fn shutdown(&self) {
        for mount in &self.mounts {
            mount.proxy.shutdown();
        }
    }
}

async fn forward(State(proxy): State<Arc<UpstreamProxy>>, request: Request) -> Response {
    proxy.handle(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListenerConfig, UpstreamConfig};

    fn listener() -> ListenerConfig {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        ListenerConfig {
            address: "127.0.0.1".into(),
            port,
            ..ListenerConfig::default()
        }
    }

    fn upstream(url: &str) -> UpstreamConfig {
        UpstreamConfig {
            url: url.into(),
            ..UpstreamConfig::default()
        }
    }

    #[tokio::test]
    async fn disabled_backends_are_skipped() {
        let config = GatewayConfig {
            distributor: upstream("http://127.0.0.1:9009"),
            ..GatewayConfig::default()
        };

        let gateway = Gateway::new(&config).await.unwrap();
        assert_eq!(gateway.enabled().collect::<Vec<_>>(), vec![BackendKind::Distributor]);
        assert!(gateway.proxy(BackendKind::Ruler).is_none());
        assert_eq!(
            gateway.paths(BackendKind::Distributor).unwrap(),
            &["/api/v1/push".to_string(), "/api/prom/push".to_string()]
        );
    }

    #[tokio::test]
    async fn invalid_url_aborts_construction() {
        let config = GatewayConfig {
            frontend: upstream("not-a-url"),
            ..GatewayConfig::default()
        };

        let err = Gateway::new(&config).await.err().unwrap();
        assert!(matches!(
            err,
            GatewayError::Proxy { kind: BackendKind::QueryFrontend, source: ProxyError::InvalidUrl { .. } }
        ));
    }

    #[tokio::test]
    async fn overlapping_overrides_conflict() {
        let config = GatewayConfig {
            distributor: upstream("http://127.0.0.1:9009"),
            ruler: UpstreamConfig {
                paths: vec!["/api/v1/push".into()],
                ..upstream("http://127.0.0.1:9010")
            },
            ..GatewayConfig::default()
        };

        let gateway = Gateway::new(&config).await.unwrap();
        let mut server = Server::new(listener(), listener(), Vec::new()).await.unwrap();
        let err = gateway.register_routes(&mut server).unwrap_err();
        assert!(matches!(err, GatewayError::Server(ServerError::RouteConflict { .. })));
    }
}
