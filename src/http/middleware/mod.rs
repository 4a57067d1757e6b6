//! Middleware composition.
//!
//! Every listener's handler is the router wrapped in an ordered list of
//! middleware. Index 0 ends up outermost, so a request flows through the
//! list front to back before reaching the route handler.

pub mod instrument;

use std::sync::Arc;

use axum::Router;

pub use instrument::Instrument;

/// Something that wraps a router in extra request handling.
pub trait Middleware: Send + Sync {
    fn wrap(&self, router: Router) -> Router;
}

/// Apply `chain` so that `chain[0]` is the outermost layer.
pub fn merge(router: Router, chain: &[Arc<dyn Middleware>]) -> Router {
    chain.iter().rev().fold(router, |router, m| m.wrap(router))
}
