//! Reverse proxy for one backend kind.
//!
//! # Responsibilities
//! - Validate the target URL and resolve the effective timeouts
//! - Own the balancer, its refresh loop and the transport
//! - Rewrite inbound requests for the backend and stream responses back
//!
//! # Design Decisions
//! - `Authorization` never leaves the gateway
//! - The client timeout is one deadline covering headers and body
//! - Dropping the proxy stops its DNS refresh loop

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::{header, Uri, Version};
use axum::response::{IntoResponse, Response};
use axum::BoxError;
use futures_util::stream::{self, StreamExt};
use hyper::body::Incoming;
use tokio::time::{sleep_until, timeout_at, Instant};
use url::Url;

use crate::config::UpstreamConfig;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{Resolve, RoundRobinBalancer, SystemResolver};
use crate::proxy::{ForwardError, ProxyError, UpstreamConnector, UpstreamTransport};
use crate::routing::{BackendKind, UpstreamTimeouts};
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};

/// Forwards requests to one configured backend.
pub struct UpstreamProxy {
    kind: BackendKind,
    target: Url,
    timeouts: UpstreamTimeouts,
    transport: UpstreamTransport,
    shutdown: Shutdown,
}

impl UpstreamProxy {
    /// Build a proxy resolving the target host through the system resolver.
    pub async fn new(target_url: &str, config: &UpstreamConfig, kind: BackendKind) -> Result<Self, ProxyError> {
        Self::with_resolver(target_url, config, kind, Arc::new(SystemResolver)).await
    }

    /// Build a proxy with an explicit resolver.
    ///
    /// Resolves the target host once before returning and spawns the DNS
    /// refresh loop.
    pub async fn with_resolver(
        target_url: &str,
        config: &UpstreamConfig,
        kind: BackendKind,
        resolver: Arc<dyn Resolve>,
    ) -> Result<Self, ProxyError> {
        let target = parse_target(target_url)?;
        let hostname = target
            .host_str()
            .unwrap_or_default()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let timeouts = UpstreamTimeouts::resolve(config, kind);

        let connector = match target.scheme() {
            "https" => UpstreamConnector::https(timeouts.dial, timeouts.tls_handshake, &hostname)?,
            _ => UpstreamConnector::http(timeouts.dial),
        };

        let balancer = Arc::new(RoundRobinBalancer::new(hostname, resolver).await?);
        let transport = UpstreamTransport::new(connector, Arc::clone(&balancer), &timeouts);

        let shutdown = Shutdown::new();
        tokio::spawn(Arc::clone(&balancer).run_refresh(timeouts.dns_refresh, shutdown.subscribe()));

        tracing::info!(
            backend = %kind,
            target = %target,
            addresses = ?balancer.addresses(),
            client_timeout = ?timeouts.client,
            "Upstream proxy ready"
        );

        Ok(Self {
            kind,
            target,
            timeouts,
            transport,
            shutdown,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Forward `request` and return the backend's response, or a 502/504.
    pub async fn handle(&self, request: Request) -> Response {
        match self.forward(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(backend = %self.kind, error = %e, "Forwarding failed");
                e.into_response()
            }
        }
    }

    /// Stop the DNS refresh loop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    async fn forward(&self, request: Request) -> Result<Response, ForwardError> {
        let deadline = Instant::now() + self.timeouts.client;
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let (mut parts, body) = request.into_parts();
        parts.headers.remove(header::AUTHORIZATION);
        strip_hop_by_hop(&mut parts.headers);
        if let Some(ip) = peer {
            append_forwarded_for(&mut parts.headers, ip);
        }
        parts.uri = self.target_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;

        let response = timeout_at(deadline, self.transport.round_trip(Request::from_parts(parts, body)))
            .await
            .map_err(|_| ForwardError::Timeout)??;

        let (mut parts, incoming) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, body_until(incoming, deadline)))
    }

    /// Target base URL joined with the inbound path and query.
    fn target_uri(&self, inbound: &Uri) -> Result<Uri, ForwardError> {
        let path = join_paths(self.target.path(), inbound.path());
        let query = match (self.target.query().filter(|q| !q.is_empty()), inbound.query()) {
            (Some(base), Some(extra)) if !extra.is_empty() => Some(format!("{}&{}", base, extra)),
            (Some(base), _) => Some(base.to_string()),
            (None, extra) => extra.filter(|q| !q.is_empty()).map(str::to_string),
        };

        let mut authority = self.target.host_str().unwrap_or_default().to_string();
        if let Some(port) = self.target.port() {
            authority = format!("{}:{}", authority, port);
        }

        let builder = Uri::builder().scheme(self.target.scheme()).authority(authority);
        let uri = match query {
            Some(query) => builder.path_and_query(format!("{}?{}", path, query)),
            None => builder.path_and_query(path),
        }
        .build()?;
        Ok(uri)
    }
}

impl Drop for UpstreamProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

fn parse_target(target_url: &str) -> Result<Url, ProxyError> {
    let invalid = |reason: String| ProxyError::InvalidUrl {
        url: target_url.to_string(),
        reason,
    };

    let target = Url::parse(target_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(target.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", target.scheme())));
    }
    if target.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(target)
}

/// Join two URL paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Stream `incoming` until `deadline`, then fail the body.
fn body_until(incoming: Incoming, deadline: Instant) -> Body {
    let chunks = Body::new(incoming).into_data_stream();
    let expiry = Box::pin(sleep_until(deadline));

    let limited = stream::unfold(Some((chunks, expiry)), |state| async move {
        let (mut chunks, mut expiry) = state?;
        tokio::select! {
            chunk = chunks.next() => {
                let chunk: Result<Bytes, BoxError> = chunk?.map_err(Into::into);
                Some((chunk, Some((chunks, expiry))))
            }
            _ = &mut expiry => {
                let err: BoxError = io::Error::new(io::ErrorKind::TimedOut, "upstream client timeout exceeded").into();
                Some((Err(err), None))
            }
        }
    });

    Body::from_stream(limited)
}
