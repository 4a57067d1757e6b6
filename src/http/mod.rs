//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper HTTP/1 connection, header read timeout)
//!     → TraceLayer → write timeout
//!     → middleware/instrument.rs (duration histogram, every request)
//!     → caller middleware, e.g. tenant authentication (matched routes only)
//!     → route handler, or the 404 catch-all
//! ```

pub mod middleware;
pub mod server;

pub use middleware::{merge, Instrument, Middleware};
pub use server::{ListenerKind, Server, ServerError, NOT_FOUND_BODY};
