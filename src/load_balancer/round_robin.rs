//! Round-robin address selection over a periodically re-resolved hostname.
//!
//! # Responsibilities
//! - Hold the resolved address list and the rotating cursor
//! - Hand out one address per forwarding attempt
//! - Re-resolve on an interval until shutdown
//!
//! # Design Decisions
//! - `std::sync::Mutex`: the critical section is a few instructions and never
//!   spans an `.await`
//! - The cursor is a monotonic counter, reset only when the list is replaced

use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::Resolve;

/// Errors produced by the balancer.
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("failed to resolve {hostname}: {source}")]
    Resolve {
        hostname: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no addresses found for {hostname}")]
    NoRecords { hostname: String },

    #[error("no address available for {hostname}")]
    NoAddress { hostname: String },
}

#[derive(Debug, Default)]
struct State {
    addresses: Vec<IpAddr>,
    cursor: usize,
}

/// Round-robin balancer for a single upstream hostname.
pub struct RoundRobinBalancer {
    hostname: String,
    resolver: Arc<dyn Resolve>,
    state: Mutex<State>,
}

impl RoundRobinBalancer {
    /// Resolve `hostname` once and build the balancer.
    ///
    /// Fails if the first resolution errors or yields no addresses.
    pub async fn new(hostname: impl Into<String>, resolver: Arc<dyn Resolve>) -> Result<Self, BalancerError> {
        let hostname = hostname.into();
        let addresses = resolve(&hostname, resolver.as_ref()).await?;

        tracing::debug!(hostname = %hostname, addresses = ?addresses, "Upstream resolved");

        Ok(Self {
            hostname,
            resolver,
            state: Mutex::new(State { addresses, cursor: 0 }),
        })
    }

    /// Hostname being balanced.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Pick the next address and advance the cursor.
    pub fn next_address(&self) -> Result<IpAddr, BalancerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.addresses.is_empty() {
            return Err(BalancerError::NoAddress {
                hostname: self.hostname.clone(),
            });
        }

        let address = state.addresses[state.cursor % state.addresses.len()];
        state.cursor = state.cursor.wrapping_add(1);
        Ok(address)
    }

    /// Snapshot of the current address list.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .addresses
            .clone()
    }

    /// Re-resolve the hostname and swap in the result.
    ///
    /// On failure the current list is left untouched.
    pub async fn refresh(&self) -> Result<(), BalancerError> {
        let addresses = resolve(&self.hostname, self.resolver.as_ref()).await?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.addresses != addresses {
            tracing::debug!(
                hostname = %self.hostname,
                old = ?state.addresses,
                new = ?addresses,
                "Upstream address list changed"
            );
        }
        state.addresses = addresses;
        state.cursor = 0;
        Ok(())
    }

    /// Refresh every `interval` until `shutdown` fires.
    pub async fn run_refresh(self: Arc<Self>, interval: Duration, mut shutdown: ShutdownSignal) {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(hostname = %self.hostname, "DNS refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(
                            hostname = %self.hostname,
                            error = %e,
                            "DNS refresh failed, keeping previous addresses"
                        );
                    }
                }
            }
        }
    }

    #[cfg(test)]
    fn with_addresses(hostname: &str, resolver: Arc<dyn Resolve>, addresses: Vec<IpAddr>) -> Self {
        Self {
            hostname: hostname.to_string(),
            resolver,
            state: Mutex::new(State { addresses, cursor: 0 }),
        }
    }
}

async fn resolve(hostname: &str, resolver: &dyn Resolve) -> Result<Vec<IpAddr>, BalancerError> {
    let addresses = resolver
        .resolve(hostname)
        .await
        .map_err(|source| BalancerError::Resolve {
            hostname: hostname.to_string(),
            source,
        })?;

    if addresses.is_empty() {
        return Err(BalancerError::NoRecords {
            hostname: hostname.to_string(),
        });
    }
    Ok(addresses)
}
