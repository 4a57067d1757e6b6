//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (authenticated listener, matched route):
//!     → auth.rs (try tenants in order, stamp X-Scope-OrgID)
//!     → tenant.rs (per-kind credential check, constant-time compare)
//!     → proxy
//!
//! Outgoing request:
//!     → headers.rs (strip hop-by-hop, extend X-Forwarded-For)
//! ```
//!
//! # Design Decisions
//! - Fail closed: no matching tenant means 401
//! - Credentials never leave the gateway (the proxy drops Authorization)
//! - No trust in client input: the org header is overwritten unless passthrough

pub mod auth;
pub mod headers;
pub mod tenant;

pub use auth::{TenantAuthenticator, BASIC_CHALLENGE, ORG_ID_HEADER};
pub use tenant::{AuthKind, Authenticator, BasicAuthenticator, Tenant};
