//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → listener.rs resolve_port (configured port, or probe the default)
//!     → listener.rs bind (semaphore sized by max_connections)
//!
//! Incoming TCP connection
//!     → listener.rs accept (wait for a permit, then accept)
//!     → connection.rs (connection id, active count)
//!     → Hand off to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection is tracked so shutdown can report what it drained

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{resolve_port, ConnectionPermit, Listener, ListenerError};
