//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (request-duration histogram)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → GET /metrics on the unauthenticated listener (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Each server owns its metrics registry; no process-global recorder
//! - Metrics are cheap (atomic increments behind registered handles)

pub mod logging;
pub mod metrics;
