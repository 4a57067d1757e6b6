//! Route pattern semantics.
//!
//! # Responsibilities
//! - Validate operator-supplied path patterns
//! - Translate multiplexer-style patterns into router paths
//!
//! # Design Decisions
//! - A pattern ending in `/` owns its whole subtree; anything else is exact
//! - Patterns are literal: router parameter syntax (`{...}`) is rejected
//! - Path matching is case-sensitive

use std::fmt;

/// Invalid route pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern {0:?} must start with '/'")]
    MissingLeadingSlash(String),
    #[error("pattern {0:?} must not contain '{{' or '}}'")]
    ReservedCharacter(String),
}

/// A validated path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutePattern {
    raw: String,
}

impl RoutePattern {
    /// Validate a raw pattern.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(raw.to_string()));
        }
        if raw.contains(['{', '}']) {
            return Err(PatternError::ReservedCharacter(raw.to_string()));
        }
        Ok(Self { raw: raw.to_string() })
    }

    /// Whether the pattern also matches everything below it.
    pub fn is_subtree(&self) -> bool {
        self.raw.ends_with('/')
    }

    /// Router paths that together implement this pattern.
    pub fn router_paths(&self) -> Vec<String> {
        if self.is_subtree() {
            vec![self.raw.clone(), format!("{}{{*rest}}", self.raw)]
        } else {
            vec![self.raw.clone()]
        }
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern() {
        let pattern = RoutePattern::parse("/api/v1/push").unwrap();
        assert!(!pattern.is_subtree());
        assert_eq!(pattern.router_paths(), vec!["/api/v1/push".to_string()]);
    }

    #[test]
    fn subtree_pattern() {
        let pattern = RoutePattern::parse("/alertmanager/").unwrap();
        assert!(pattern.is_subtree());
        assert_eq!(
            pattern.router_paths(),
            vec!["/alertmanager/".to_string(), "/alertmanager/{*rest}".to_string()]
        );
    }

    #[test]
    fn rejects_invalid_patterns() {
        assert_eq!(
            RoutePattern::parse("api/v1/push"),
            Err(PatternError::MissingLeadingSlash("api/v1/push".into()))
        );
        assert!(matches!(
            RoutePattern::parse("/api/{tenant}/push"),
            Err(PatternError::ReservedCharacter(_))
        ));
    }
}
