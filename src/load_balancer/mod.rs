//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream proxy constructed
//!     → resolver.rs (resolve upstream hostname to an ordered IP list)
//!     → round_robin.rs (store list, cursor = 0)
//!     → refresh loop (re-resolve every interval, swap list, reset cursor)
//!
//! Forwarded request
//!     → round_robin.rs next_address() (lock, pick, advance, unlock)
//!     → transport dials the selected address
//! ```
//!
//! # Design Decisions
//! - Selection is atomic; the outbound call happens after the lock is released
//! - A failed refresh keeps the last known good list
//! - The refresh loop is bound to a shutdown signal, not left running forever
//! - Resolution sits behind a trait so tests can script DNS answers

pub mod resolver;
pub mod round_robin;

pub use resolver::{Resolve, SystemResolver};
pub use round_robin::{BalancerError, RoundRobinBalancer};
