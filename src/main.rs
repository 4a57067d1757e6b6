//! `auth-gateway` binary.
//!
//! ```text
//! auth-gateway <CONFIG> [--log-level LEVEL]
//!
//!     load + validate config
//!     → init logging
//!     → bind listeners, build upstream proxies, register routes
//!     → serve until SIGINT/SIGTERM
//!     → readiness false, drain listeners, stop DNS refresh loops
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use auth_gateway::config::loader::load_config;
use auth_gateway::lifecycle::signals::wait_for_termination;
use auth_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "auth-gateway", version)]
#[command(about = "Authenticating gateway for multi-tenant Cortex clusters", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    config: PathBuf,

    /// Log level used when RUST_LOG is not set (overrides the config file).
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init(cli.log_level.as_deref().unwrap_or(config.log_level()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        tenants = config.tenants.len(),
        "auth-gateway starting"
    );

    let (server, gateway) = auth_gateway::assemble(&config).await?;
    let server = Arc::new(server);
    let gateway = Arc::new(gateway);

    tokio::spawn({
        let server = Arc::clone(&server);
        let gateway = Arc::clone(&gateway);
        async move {
            match wait_for_termination().await {
                Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Signal handler failed, shutting down"),
            }
            server.shutdown().await;
            gateway.shutdown();
        }
    });

    server.run().await?;
    tracing::info!("auth-gateway stopped");
    Ok(())
}
