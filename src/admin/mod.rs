//! Unauthenticated admin endpoints.
//!
//! # Data Flow
//! ```text
//! Unauthenticated listener
//!     → GET /ready          (readiness flag)
//!     → GET /metrics        (Prometheus text exposition)
//!     → GET /debug/pprof/*  (runtime introspection, unknown profiles 404)
//! ```
//!
//! # Design Decisions
//! - Readiness is a shared flag owned by the server; handlers only read it
//! - Never mounted on the authenticated listener

pub mod handlers;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};

use crate::observability::metrics::GatewayMetrics;
use self::handlers::*;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub ready: Arc<AtomicBool>,
    pub metrics: Arc<GatewayMetrics>,
    pub started: Instant,
}

/// Paths served by [`admin_router`].
pub const ADMIN_PATHS: &[&str] = &[
    "/ready",
    "/metrics",
    "/debug/pprof/",
    "/debug/pprof/runtime",
    "/debug/pprof/build",
    "/debug/pprof/{*rest}",
];

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/debug/pprof/", get(pprof_index))
        .route("/debug/pprof/runtime", get(pprof_runtime))
        .route("/debug/pprof/build", get(pprof_build))
        .route("/debug/pprof/{*rest}", get(pprof_unknown))
        .with_state(state)
}
