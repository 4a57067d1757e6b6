//! Dual-listener HTTP server.
//!
//! # Responsibilities
//! - Bind the authenticated and unauthenticated listeners up front
//! - Collect route registrations and reject duplicate patterns
//! - Wrap each listener's router in its middleware chain when serving starts
//! - Serve both listeners concurrently and expose readiness
//! - Drain both listeners within the grace period on shutdown
//!
//! # Design Decisions
//! - Instrumentation wraps everything, including 404s; caller middleware is
//!   expected to use `route_layer` so unmatched paths skip authentication
//! - One accept loop per listener, each connection on its own task, with
//!   hyper-util's graceful shutdown watching every connection
//! - Connections still open when the grace period ends are aborted
//!
//! # Lifecycle
//! ```text
//! new (bind) → register* → run (serving, ready) → shutdown (terminal)
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::ConnectInfo,
    http::StatusCode,
    routing::MethodRouter,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::{admin_router, AdminState, ADMIN_PATHS};
use crate::config::ListenerConfig;
use crate::http::middleware::{merge, Instrument, Middleware};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{resolve_port, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics::GatewayMetrics;
use crate::routing::{PatternError, RoutePattern};

/// Body of the catch-all response.
pub const NOT_FOUND_BODY: &str = "404 - Resource not found";

/// The two listeners of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Proxied API traffic, behind tenant authentication.
    Authenticated,
    /// Readiness, metrics and profiling.
    Unauthenticated,
}

impl ListenerKind {
    /// Port probed when the configured port is `0`.
    pub fn default_port(&self) -> u16 {
        match self {
            ListenerKind::Authenticated => 80,
            ListenerKind::Unauthenticated => 8081,
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Authenticated => f.write_str("authenticated"),
            ListenerKind::Unauthenticated => f.write_str("unauthenticated"),
        }
    }
}

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{listener} listener: {source}")]
    Listener {
        listener: ListenerKind,
        #[source]
        source: ListenerError,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("route {pattern} registered twice on the {listener} listener")]
    RouteConflict { pattern: String, listener: ListenerKind },

    #[error("server is already running")]
    AlreadyRunning,
}

/// One listener's routing table and settings.
struct Endpoint {
    kind: ListenerKind,
    config: ListenerConfig,
    local_addr: SocketAddr,
    router: Router,
    patterns: HashSet<String>,
}

impl Endpoint {
    fn new(kind: ListenerKind, config: ListenerConfig, local_addr: SocketAddr) -> Self {
        Self {
            kind,
            config,
            local_addr,
            router: Router::new(),
            patterns: HashSet::new(),
        }
    }

    fn add(&mut self, pattern: &RoutePattern, handler: MethodRouter) -> Result<(), ServerError> {
        let paths = pattern.router_paths();
        if paths.iter().any(|path| self.patterns.contains(path)) {
            return Err(ServerError::RouteConflict {
                pattern: pattern.to_string(),
                listener: self.kind,
            });
        }

        for path in paths {
            self.router = std::mem::take(&mut self.router).route(&path, handler.clone());
            self.patterns.insert(path);
        }
        Ok(())
    }
}

/// Authenticated plus unauthenticated HTTP listeners with shared metrics
/// and readiness.
pub struct Server {
    auth: Endpoint,
    unauth: Endpoint,
    middleware: Vec<Arc<dyn Middleware>>,
    metrics: Arc<GatewayMetrics>,
    ready: Arc<AtomicBool>,
    shutdown: Shutdown,
    listeners: Mutex<Option<(Listener, Listener)>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Bind both listeners.
    ///
    /// `middleware` wraps the authenticated listener's routes, inside the
    /// instrumentation layer and in the given order.
    pub async fn new(
        auth_config: ListenerConfig,
        unauth_config: ListenerConfig,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<Self, ServerError> {
        let auth_listener = bind(ListenerKind::Authenticated, &auth_config).await?;
        let unauth_listener = bind(ListenerKind::Unauthenticated, &unauth_config).await?;

        let auth_addr = auth_listener.local_addr();
        let unauth_addr = unauth_listener.local_addr();

        let metrics = Arc::new(GatewayMetrics::new());
        let ready = Arc::new(AtomicBool::new(false));

        let mut unauth = Endpoint::new(ListenerKind::Unauthenticated, unauth_config, unauth_addr);
        unauth.router = admin_router(AdminState {
            ready: Arc::clone(&ready),
            metrics: Arc::clone(&metrics),
            started: Instant::now(),
        });
        unauth.patterns.extend(ADMIN_PATHS.iter().map(|p| p.to_string()));

        Ok(Self {
            auth: Endpoint::new(ListenerKind::Authenticated, auth_config, auth_addr),
            unauth,
            middleware,
            metrics,
            ready,
            shutdown: Shutdown::new(),
            listeners: Mutex::new(Some((auth_listener, unauth_listener))),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Register `handler` for `pattern` on one listener.
    ///
    /// Patterns ending in `/` also match their whole subtree. Registrations
    /// made after [`Server::run`] has started are not served.
    pub fn register(&mut self, listener: ListenerKind, pattern: &str, handler: MethodRouter) -> Result<(), ServerError> {
        let pattern = RoutePattern::parse(pattern)?;
        tracing::debug!(listener = %listener, pattern = %pattern, "Route registered");
        self.endpoint_mut(listener).add(&pattern, handler)
    }

    /// Address a listener is bound to.
    pub fn local_addr(&self, listener: ListenerKind) -> SocketAddr {
        self.endpoint(listener).local_addr
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Serve both listeners until shutdown or a fatal listener error.
    ///
    /// The server reports ready once both accept loops are dispatched.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.shutdown.is_triggered() {
            return Ok(());
        }

        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some((auth_listener, unauth_listener)) = listeners else {
            // shutdown closed the listeners before they were served
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            return Err(ServerError::AlreadyRunning);
        };

        let instrument: Arc<dyn Middleware> = Arc::new(Instrument::new(Arc::clone(&self.metrics)));
        let mut auth_chain = vec![Arc::clone(&instrument)];
        auth_chain.extend(self.middleware.iter().cloned());
        let unauth_chain = vec![instrument];

        let (tx, mut rx) = mpsc::channel(2);
        let mut handles = Vec::with_capacity(2);
        for (endpoint, listener, chain) in [
            (&self.auth, auth_listener, auth_chain),
            (&self.unauth, unauth_listener, unauth_chain),
        ] {
            let app = build_app(endpoint, &chain);
            let accept = AcceptLoop {
                kind: endpoint.kind,
                read_timeout: Duration::from_secs(endpoint.config.read_timeout_secs),
                grace: Duration::from_secs(endpoint.config.graceful_shutdown_timeout_secs),
            };
            let shutdown = self.shutdown.subscribe();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let result = accept.serve(listener, app, shutdown).await;
                let _ = tx.send(result).await;
            }));
        }
        drop(tx);

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);

        self.ready.store(true, Ordering::SeqCst);
        // a shutdown racing the store above must still leave readiness false
        if self.shutdown.is_triggered() {
            self.ready.store(false, Ordering::SeqCst);
        } else {
            tracing::info!(
                authenticated = %self.auth.local_addr,
                unauthenticated = %self.unauth.local_addr,
                "Server ready"
            );
        }

        while let Some(result) = rx.recv().await {
            result?;
        }
        Ok(())
    }

    /// Stop serving: readiness goes false, listeners close, in-flight
    /// requests drain for up to the grace period.
    ///
    /// Only the first call does anything.
    pub async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        if !self.shutdown.trigger() {
            return;
        }
        self.ready.store(false, Ordering::SeqCst);
        tracing::info!("Server shutting down");

        // Listeners that never started serving are closed here.
        drop(self.listeners.lock().unwrap_or_else(PoisonError::into_inner).take());

        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Listener task ended abnormally");
            }
        }
        tracing::info!("Server stopped");
    }

    fn endpoint(&self, listener: ListenerKind) -> &Endpoint {
        match listener {
            ListenerKind::Authenticated => &self.auth,
            ListenerKind::Unauthenticated => &self.unauth,
        }
    }

    fn endpoint_mut(&mut self, listener: ListenerKind) -> &mut Endpoint {
        match listener {
            ListenerKind::Authenticated => &mut self.auth,
            ListenerKind::Unauthenticated => &mut self.unauth,
        }
    }
}

async fn bind(kind: ListenerKind, config: &ListenerConfig) -> Result<Listener, ServerError> {
    let wrap = |source| ServerError::Listener { listener: kind, source };
    let addr = resolve_port(config, kind.default_port()).map_err(wrap)?;
    Listener::bind(addr, config.max_connections).await.map_err(wrap)
}

/// Final router for one listener: routes, 404 fallback, middleware chain,
/// write timeout and request tracing.
#[allow(deprecated)]
fn build_app(endpoint: &Endpoint, chain: &[Arc<dyn Middleware>]) -> Router {
    let router = endpoint.router.clone().fallback(not_found);
    merge(router, chain)
        .layer(TimeoutLayer::new(Duration::from_secs(endpoint.config.write_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

struct AcceptLoop {
    kind: ListenerKind,
    read_timeout: Duration,
    grace: Duration,
}

impl AcceptLoop {
    async fn serve(self, listener: Listener, app: Router, mut shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let graceful = GracefulShutdown::new();
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();

        tracing::info!(
            listener = %self.kind,
            address = %listener.local_addr(),
            "Listener serving"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(listener = %self.kind, error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                        Err(ListenerError::Closed) => break,
                        Err(source) => return Err(ServerError::Listener { listener: self.kind, source }),
                    };

                    let guard = tracker.track();
                    let app = app.clone();
                    let service = service_fn(move |mut request: axum::http::Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer));
                        app.clone().oneshot(request)
                    });

                    let connection = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .header_read_timeout(self.read_timeout)
                        .serve_connection(TokioIo::new(stream), service);
                    let connection = graceful.watch(connection);

                    let kind = self.kind;
                    connections.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = connection.await {
                            tracing::debug!(listener = %kind, connection_id = %guard.id(), error = %e, "Connection error");
                        }
                    });
                }
            }
        }

        drop(listener);
        tracing::info!(
            listener = %self.kind,
            in_flight = tracker.active_count(),
            "Listener closed, draining connections"
        );

        tokio::select! {
            _ = graceful.shutdown() => {
                tracing::info!(listener = %self.kind, "Connections drained");
            }
            _ = tokio::time::sleep(self.grace) => {
                tracing::warn!(
                    listener = %self.kind,
                    remaining = tracker.active_count(),
                    "Grace period expired, aborting connections"
                );
                connections.abort_all();
            }
        }
        Ok(())
    }
}
