//! Tenant authentication middleware.
//!
//! # Responsibilities
//! - Try each configured tenant, in order, against the request credentials
//! - Stamp the winning tenant's ID into the org scope header
//! - Reject everything else with a Basic challenge
//!
//! # Design Decisions
//! - First match wins; a duplicate username later in the list is unreachable
//! - Each tenant is tried at most once per request
//! - Only matched routes are guarded, so unknown paths still answer 404

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};

use crate::http::middleware::Middleware;
use crate::security::tenant::Tenant;

/// Header telling multi-tenant backends which organisation a request belongs to.
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Challenge sent with every 401.
pub const BASIC_CHALLENGE: &str = r#"Basic realm="Restricted""#;

/// Validates inbound credentials against the configured tenant list.
#[derive(Debug, Clone)]
pub struct TenantAuthenticator {
    tenants: Arc<[Tenant]>,
}

impl TenantAuthenticator {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        Self {
            tenants: tenants.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Authenticate a request, returning the matched tenant's ID.
    ///
    /// On success the org scope header is overwritten with the tenant ID
    /// unless the tenant is marked passthrough.
    pub fn authenticate(&self, request: &mut Request) -> Option<String> {
        let tenant = self
            .tenants
            .iter()
            .find(|tenant| tenant.authenticate(request.headers()))?;

        if !tenant.passthrough {
            match HeaderValue::from_str(&tenant.id) {
                Ok(value) => {
                    request.headers_mut().insert(ORG_ID_HEADER, value);
                }
                Err(_) => {
                    tracing::error!(tenant = %tenant.id, "Tenant ID is not a valid header value");
                    return None;
                }
            }
        }

        Some(tenant.id.clone())
    }
}

impl Middleware for TenantAuthenticator {
    fn wrap(&self, router: Router) -> Router {
        router.route_layer(middleware::from_fn_with_state(self.clone(), authenticate))
    }
}

/// Middleware function guarding proxied routes.
pub async fn authenticate(
    State(auth): State<TenantAuthenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth.authenticate(&mut request) {
        Some(tenant) => {
            tracing::trace!(tenant = %tenant, path = %request.uri().path(), "Tenant authenticated");
            next.run(request).await
        }
        None => {
            tracing::debug!(path = %request.uri().path(), "No valid tenant credentials found");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, BASIC_CHALLENGE)],
        "Unauthorized",
    )
        .into_response()
}
