//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cortex_request_duration_seconds` (histogram): time spent serving HTTP
//!   requests, labelled by `method`, `route`, `status_code` and `ws`
//!
//! # Design Decisions
//! - One Prometheus recorder per server instance, driven directly through
//!   the `metrics::Recorder` trait, so tests and multiple servers never
//!   fight over a global recorder
//! - Labels for route, status, websocket upgrade

use std::time::Duration;

use metrics::{Key, Label, Level, Metadata, Recorder, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

/// Name of the request-duration histogram.
pub const REQUEST_DURATION: &str = "cortex_request_duration_seconds";

const REQUEST_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0,
];

/// Metrics registry shared by both listeners of a server.
pub struct GatewayMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let builder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            REQUEST_DURATION_BUCKETS,
        ) {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid histogram buckets, falling back to summaries");
                PrometheusBuilder::new()
            }
        };

        let recorder = builder.build_recorder();
        recorder.describe_histogram(
            REQUEST_DURATION.into(),
            Some(Unit::Seconds),
            "Time (in seconds) spent serving HTTP requests.".into(),
        );
        let handle = recorder.handle();

        Self { recorder, handle }
    }

    /// Record one served request.
    pub fn observe_request(&self, method: &str, route: &str, status: u16, websocket: bool, elapsed: Duration) {
        let labels = vec![
            Label::new("method", method.to_string()),
            Label::new("route", route.to_string()),
            Label::new("status_code", status.to_string()),
            Label::new("ws", websocket.to_string()),
        ];
        let key = Key::from_parts(REQUEST_DURATION, labels);
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

        self.recorder
            .register_histogram(&key, &metadata)
            .record(elapsed.as_secs_f64());
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
