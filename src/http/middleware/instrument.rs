//! Request instrumentation.
//!
//! Records method, route, status code and duration of every request into
//! the server's request-duration histogram, whatever the outcome of the
//! middleware inside it.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
    Router,
};

use crate::http::middleware::Middleware;
use crate::observability::metrics::GatewayMetrics;

/// Route label for requests that matched no registered pattern.
const UNMATCHED_ROUTE: &str = "other";

/// Instrumentation middleware bound to a metrics registry.
#[derive(Clone)]
pub struct Instrument {
    metrics: Arc<GatewayMetrics>,
}

impl Instrument {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self { metrics }
    }
}

impl Middleware for Instrument {
    fn wrap(&self, router: Router) -> Router {
        router.layer(middleware::from_fn_with_state(self.metrics.clone(), record_request))
    }
}

async fn record_request(
    State(metrics): State<Arc<GatewayMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let websocket = is_websocket_upgrade(&request);

    let response = next.run(request).await;

    metrics.observe_request(
        method.as_str(),
        &route,
        response.status().as_u16(),
        websocket,
        start.elapsed(),
    );
    response
}

fn is_websocket_upgrade(request: &Request) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}
