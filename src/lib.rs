//! Multi-tenant authenticating gateway.
//!
//! Sits in front of a Cortex-style cluster (distributor, query-frontend,
//! alertmanager, ruler), checks HTTP Basic credentials against a tenant
//! list, stamps the tenant's organization header and forwards the request
//! to a DNS round-robin balanced upstream.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Traffic management
pub mod load_balancer;
pub mod proxy;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod security;

use std::sync::Arc;

pub use config::GatewayConfig;
pub use http::{ListenerKind, Server};
pub use lifecycle::Shutdown;
pub use routing::{Gateway, GatewayError};

use crate::http::Middleware;
use crate::security::TenantAuthenticator;

/// Bind the server, build every upstream proxy and register their routes.
///
/// Nothing is served until [`Server::run`] is called on the result.
pub async fn assemble(config: &GatewayConfig) -> Result<(Server, Gateway), GatewayError> {
    let authenticator = TenantAuthenticator::new(config.tenants.clone());
    if authenticator.is_empty() {
        tracing::warn!("No tenants configured, every proxied request will be rejected");
    }
    let authenticator: Arc<dyn Middleware> = Arc::new(authenticator);
    let mut server = Server::new(config.server.clone(), config.admin.clone(), vec![authenticator]).await?;

    let gateway = Gateway::new(config).await?;
    gateway.register_routes(&mut server)?;

    Ok((server, gateway))
}
