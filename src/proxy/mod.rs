//! Upstream forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated request (route matched)
//!     → upstream.rs (strip Authorization + hop-by-hop, X-Forwarded-For,
//!                    join target path, start client deadline)
//!     → transport.rs (pick address from the balancer, rewrite authority
//!                     to ip:port, await headers under response timeout)
//!     → connector (dial with timeout, optional TLS with SNI)
//!     → backend
//!
//! Response
//!     → hop-by-hop headers stripped
//!     → body streamed back, cut off at the client deadline
//! ```
//!
//! # Design Decisions
//! - The balancer lock covers selection only; I/O happens after release
//! - Failures are not retried; clients see 502 or 504 with a fixed body
//! - Each proxy owns the shutdown handle of its DNS refresh loop

pub mod error;
pub mod transport;
pub mod upstream;

pub use error::{ForwardError, ProxyError, TransportError};
pub use transport::{UpstreamConnector, UpstreamTransport};
pub use upstream::UpstreamProxy;
