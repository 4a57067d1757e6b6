//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Tenant records usable as credentials and org headers
//! - Path overrides usable as route patterns
//! - Listener timeouts non-zero
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Duplicate usernames are a hazard, not an error: logged, first wins
//! - Upstream URLs are checked when the proxy is built, not here

use std::collections::HashSet;

use axum::http::HeaderValue;

use crate::config::schema::{GatewayConfig, ListenerConfig};
use crate::routing::{BackendKind, RoutePattern};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener("server", &config.server, &mut errors);
    validate_listener("admin", &config.admin, &mut errors);

    let mut usernames = HashSet::new();
    for (i, tenant) in config.tenants.iter().enumerate() {
        let field = format!("tenants[{}]", i);
        if tenant.username.is_empty() {
            errors.push(ValidationError::new(format!("{}.username", field), "must not be empty"));
        }
        if tenant.id.is_empty() {
            errors.push(ValidationError::new(format!("{}.id", field), "must not be empty"));
        } else if HeaderValue::from_str(&tenant.id).is_err() {
            errors.push(ValidationError::new(
                format!("{}.id", field),
                "must be a valid HTTP header value",
            ));
        }
        if !tenant.username.is_empty() && !usernames.insert(tenant.username.as_str()) {
            tracing::warn!(
                username = %tenant.username,
                index = i,
                "Duplicate tenant username; only the first entry can ever match"
            );
        }
    }

    for kind in BackendKind::ALL {
        let upstream = config.upstream(kind);
        for (i, path) in upstream.paths.iter().enumerate() {
            if let Err(e) = RoutePattern::parse(path) {
                errors.push(ValidationError::new(
                    format!("{}.paths[{}]", kind.config_key(), i),
                    e.to_string(),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(name: &str, listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    if listener.read_timeout_secs == 0 {
        errors.push(ValidationError::new(format!("{}.read_timeout_secs", name), "must be > 0"));
    }
    if listener.write_timeout_secs == 0 {
        errors.push(ValidationError::new(format!("{}.write_timeout_secs", name), "must be > 0"));
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::new(format!("{}.max_connections", name), "must be > 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{AuthKind, Tenant};

    fn tenant(username: &str, id: &str) -> Tenant {
        Tenant {
            id: id.to_string(),
            username: username.to_string(),
            password: "pw".to_string(),
            authentication: AuthKind::Basic,
            passthrough: false,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.tenants.push(tenant("", "org1"));
        config.tenants.push(tenant("bob", "bad\nid"));
        config.distributor.paths = vec!["api/v1/push".to_string()];
        config.admin.write_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "admin.write_timeout_secs",
                "tenants[0].username",
                "tenants[1].id",
                "distributor.paths[0]",
            ]
        );
    }

    #[test]
    fn duplicate_usernames_are_allowed() {
        let mut config = GatewayConfig::default();
        config.tenants.push(tenant("alice", "org1"));
        config.tenants.push(tenant("alice", "org2"));
        assert!(validate_config(&config).is_ok());
    }
}
