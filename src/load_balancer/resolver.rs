//! Hostname resolution.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

/// Resolves a hostname to the addresses a balancer rotates through.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolve `hostname`, preserving resolver order.
    async fn resolve(&self, hostname: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
///
/// IP literals resolve to themselves without a lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, hostname: &str) -> io::Result<Vec<IpAddr>> {
        let mut addresses: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((hostname, 0)).await? {
            // getaddrinfo may repeat an address once per socket type
            if !addresses.contains(&addr.ip()) {
                addresses.push(addr.ip());
            }
        }
        Ok(addresses)
    }
}
