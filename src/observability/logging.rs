//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once, at the composition root
//! - Honour RUST_LOG, falling back to the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Library code never installs a subscriber; only the binary does

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Fails if one is already installed.
pub fn init(default_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("auth_gateway={0},auth-gateway={0},warn", default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
