//! TCP listener with backpressure and default-port probing.
//!
//! # Responsibilities
//! - Pick the bind port: configured, or a probed per-listener default
//! - Bind before any traffic is accepted
//! - Enforce max_connections via a semaphore

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {address:?}")]
    InvalidAddress { address: String },

    #[error("default port {port} on {address} is not available: {source}")]
    PortUnavailable {
        address: IpAddr,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    #[error("listener closed")]
    Closed,
}

/// Resolve the socket address a listener should bind.
///
/// A configured port of `0` probes `default_port` by binding and
/// immediately releasing it; an unavailable default is an error.
pub fn resolve_port(config: &ListenerConfig, default_port: u16) -> Result<SocketAddr, ListenerError> {
    let address: IpAddr = config.address.parse().map_err(|_| ListenerError::InvalidAddress {
        address: config.address.clone(),
    })?;

    if config.port != 0 {
        return Ok(SocketAddr::new(address, config.port));
    }

    let probe = SocketAddr::new(address, default_port);
    match std::net::TcpListener::bind(probe) {
        Ok(listener) => {
            drop(listener);
            tracing::debug!(address = %probe, "Default port available");
            Ok(probe)
        }
        Err(source) => Err(ListenerError::PortUnavailable {
            address,
            port: default_port,
            source,
        }),
    }
}

/// A bounded TCP listener that limits concurrent connections.
///
/// When the limit is reached, accepting waits until a slot is released.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    pub async fn bind(addr: SocketAddr, max_connections: usize) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let local_addr = inner
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            local_addr,
            connection_limit: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

/// A connection slot, released when dropped (also on handler panic).
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
