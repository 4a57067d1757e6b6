//! Tenant records and per-kind credential checks.
//!
//! A tenant names the organisation a request is allowed to act for. How its
//! credentials are checked depends on its [`AuthKind`]; each kind maps to an
//! [`Authenticator`], so adding a kind never touches the tenant loop.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Identity record loaded from configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tenant {
    /// Forwarded as the organisation scope header.
    pub id: String,
    pub username: String,
    pub password: String,
    pub authentication: AuthKind,
    /// Keep an org header the client already sent.
    #[serde(default)]
    pub passthrough: bool,
}

impl Tenant {
    /// Whether the request carries this tenant's credentials.
    pub fn authenticate(&self, headers: &HeaderMap) -> bool {
        self.authentication.authenticator().verify(self, headers)
    }

    /// Compare both fields in constant time; both comparisons always run.
    fn credentials_match(&self, username: &[u8], password: &[u8]) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username);
        let pass_ok = self.password.as_bytes().ct_eq(password);
        bool::from(user_ok & pass_ok)
    }
}

/// Supported authentication kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Basic,
}

impl AuthKind {
    /// The checker for this kind.
    pub fn authenticator(&self) -> &'static dyn Authenticator {
        match self {
            AuthKind::Basic => &BasicAuthenticator,
        }
    }
}

/// Credential check for one authentication kind.
pub trait Authenticator: Send + Sync {
    /// Returns true if the request headers prove the caller is `tenant`.
    fn verify(&self, tenant: &Tenant, headers: &HeaderMap) -> bool;
}

/// HTTP Basic authentication (RFC 7617).
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicAuthenticator;

impl Authenticator for BasicAuthenticator {
    fn verify(&self, tenant: &Tenant, headers: &HeaderMap) -> bool {
        match basic_credentials(headers) {
            Some((username, password)) => tenant.credentials_match(&username, &password),
            None => false,
        }
    }
}

/// Extract `(username, password)` from an `Authorization: Basic ...` header.
///
/// The scheme name is case-insensitive; the password is everything after the
/// first colon. Missing header, other schemes, bad base64 and a missing colon
/// all yield `None`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(Vec<u8>, Vec<u8>)> {
    let value = headers.get(header::AUTHORIZATION)?.as_bytes();
    const PREFIX: &[u8] = b"basic ";
    if value.len() < PREFIX.len() || !value[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
        return None;
    }

    let decoded = STANDARD.decode(&value[PREFIX.len()..]).ok()?;
    let colon = decoded.iter().position(|b| *b == b':')?;
    let password = decoded[colon + 1..].to_vec();
    let mut username = decoded;
    username.truncate(colon);
    Some((username, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn tenant() -> Tenant {
        Tenant {
            id: "org1".into(),
            username: "alice".into(),
            password: "secret".into(),
            authentication: AuthKind::Basic,
            passthrough: false,
        }
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn basic(user_pass: &str) -> HeaderMap {
        headers_with(&format!("Basic {}", STANDARD.encode(user_pass)))
    }

    #[test]
    fn parses_credentials() {
        let (user, pass) = basic_credentials(&basic("alice:se:cret")).unwrap();
        assert_eq!(user, b"alice");
        assert_eq!(pass, b"se:cret");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let value = format!("bAsIc {}", STANDARD.encode("alice:secret"));
        assert!(tenant().authenticate(&headers_with(&value)));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(basic_credentials(&HeaderMap::new()).is_none());
        assert!(basic_credentials(&headers_with("Bearer abc")).is_none());
        assert!(basic_credentials(&headers_with("Basic !!!not-base64")).is_none());
        assert!(basic_credentials(&headers_with(&format!("Basic {}", STANDARD.encode("nocolon")))).is_none());
        assert!(basic_credentials(&headers_with("Basic")).is_none());
    }

    #[test]
    fn verifies_username_and_password() {
        let t = tenant();
        assert!(t.authenticate(&basic("alice:secret")));
        assert!(!t.authenticate(&basic("alice:wrong")));
        assert!(!t.authenticate(&basic("mallory:secret")));
        assert!(!t.authenticate(&basic("alice:secret2")));
        assert!(!t.authenticate(&basic("alice:")));
    }
}
