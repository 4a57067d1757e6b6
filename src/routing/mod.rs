//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     GatewayConfig
//!     → backend.rs (per-kind default paths and timeouts)
//!     → gateway.rs (one UpstreamProxy per configured kind)
//!     → pattern.rs (validate, expand subtree patterns)
//!     → Server::register on the authenticated listener
//!
//! Request:
//!     exact pattern match, else longest subtree (`/x/`) match,
//!     else the 404 catch-all
//! ```
//!
//! # Design Decisions
//! - Routes are fixed before serving starts, immutable at runtime
//! - A kind without a URL registers nothing; its paths fall to the 404
//! - Path overrides replace the defaults, they are never merged

pub mod backend;
pub mod gateway;
pub mod pattern;

pub use backend::{BackendKind, UpstreamTimeouts};
pub use gateway::{Gateway, GatewayError};
pub use pattern::{PatternError, RoutePattern};
