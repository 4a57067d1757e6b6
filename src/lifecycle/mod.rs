//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Bind listeners → Build gateway → Register routes → Run
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Readiness false → Stop accepting → Drain (bounded) → Exit
//!     Gateway shutdown → DNS refresh loops cancelled
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then listeners, then upstreams
//! - Shutdown is a level, not an edge: late subscribers still observe it
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
