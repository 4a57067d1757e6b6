//! Error types for upstream forwarding.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::load_balancer::BalancerError;

/// Errors raised while establishing an upstream connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} timed out")]
    DialTimeout { addr: SocketAddr },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {addr} timed out")]
    TlsHandshakeTimeout { addr: SocketAddr },

    #[error("TLS handshake with {addr} failed: {source}")]
    Tls {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connection target {0} is not an IP address")]
    UnresolvedTarget(String),

    #[error("invalid TLS server name {0}")]
    InvalidServerName(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] tokio_rustls::rustls::Error),
}

/// Per-request forwarding failures.
///
/// Causes are logged; clients only see the status code and a fixed body.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    NoAddress(#[from] BalancerError),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    #[error("upstream connection failed: {0}")]
    Connect(#[source] hyper_util::client::legacy::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper_util::client::legacy::Error),

    #[error("timed out waiting for upstream response headers")]
    ResponseHeaderTimeout,

    #[error("upstream request exceeded the client timeout")]
    Timeout,
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::ResponseHeaderTimeout | ForwardError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match status {
            StatusCode::GATEWAY_TIMEOUT => "Gateway Timeout",
            _ => "Bad Gateway",
        };
        (status, body).into_response()
    }
}

/// Errors constructing an upstream proxy. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Balancer(#[from] BalancerError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
