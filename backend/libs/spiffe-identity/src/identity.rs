//! Identity value types
//!
//! `AuthenticatedIdentity` describes a peer that completed the mTLS
//! handshake. `ServiceIdentity` describes the local process.

use crate::error::IdentityResult;
use crate::spiffe_id::SpiffeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of an authenticated peer, derived from its certificate
///
/// ## Design Notes
///
/// - Fields are public for direct access (no getter boilerplate)
/// - Call-scoped: built per inbound call, stored in request extensions
/// - `claims` may be empty; certificate extensions carry none today
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    /// Raw identity URI (`spiffe://...`)
    pub spiffe_id: String,

    /// Trust domain, never empty
    pub trust_domain: String,

    /// Last segment of the workload path (may be empty)
    pub service_name: String,

    /// Workload path including the leading `/` (may be empty)
    pub workload_path: String,

    /// Additional key/value attributes used by required-claim checks
    pub claims: BTreeMap<String, String>,

    /// When the peer was authenticated
    pub authenticated_at: DateTime<Utc>,
}

impl AuthenticatedIdentity {
    /// Build an identity from an already parsed SPIFFE ID
    pub fn from_spiffe_id(id: &SpiffeId, authenticated_at: DateTime<Utc>) -> Self {
        Self {
            spiffe_id: id.as_str().to_string(),
            trust_domain: id.trust_domain().to_string(),
            service_name: id.service_name().to_string(),
            workload_path: id.path().to_string(),
            claims: BTreeMap::new(),
            authenticated_at,
        }
    }

    /// Parse an identity URI directly
    ///
    /// ## Errors
    ///
    /// Returns `IdentityError::InvalidIdentity` if the URI is malformed.
    pub fn parse(uri: &str, authenticated_at: DateTime<Utc>) -> IdentityResult<Self> {
        let id = SpiffeId::parse(uri)?;
        Ok(Self::from_spiffe_id(&id, authenticated_at))
    }

    /// Replace the claims map
    pub fn with_claims<I, K, V>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.claims = claims
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn claim(&self, key: &str) -> Option<&str> {
        self.claims.get(key).map(String::as_str)
    }
}

/// The local process's own identity
///
/// Returned by an [`IdentityProvider`](crate::IdentityProvider) and used on
/// the outbound side to stamp service name and trust domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub name: String,
    pub trust_domain: String,
    pub uri: String,
}

impl ServiceIdentity {
    pub fn from_spiffe_id(id: &SpiffeId) -> Self {
        Self {
            name: id.service_name().to_string(),
            trust_domain: id.trust_domain().to_string(),
            uri: id.as_str().to_string(),
        }
    }

    /// ## Errors
    ///
    /// Returns `IdentityError::InvalidIdentity` if the URI is malformed.
    pub fn parse(uri: &str) -> IdentityResult<Self> {
        SpiffeId::parse(uri).map(|id| Self::from_spiffe_id(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_parse_authenticated_identity() {
        let identity =
            AuthenticatedIdentity::parse("spiffe://example.org/workload/test-service", fixed_time())
                .expect("Should parse");

        assert_eq!(identity.spiffe_id, "spiffe://example.org/workload/test-service");
        assert_eq!(identity.trust_domain, "example.org");
        assert_eq!(identity.service_name, "test-service");
        assert_eq!(identity.workload_path, "/workload/test-service");
        assert!(identity.claims.is_empty());
        assert_eq!(identity.authenticated_at, fixed_time());
    }

    #[test]
    fn test_parse_invalid_identity() {
        assert!(AuthenticatedIdentity::parse("https://example.org/test", fixed_time()).is_err());
        assert!(AuthenticatedIdentity::parse("", fixed_time()).is_err());
        assert!(AuthenticatedIdentity::parse("spiffe://", fixed_time()).is_err());
    }

    #[test]
    fn test_with_claims() {
        let identity = AuthenticatedIdentity::parse("spiffe://example.org/api", fixed_time())
            .unwrap()
            .with_claims([("env", "prod"), ("team", "platform")]);

        assert_eq!(identity.claim("env"), Some("prod"));
        assert_eq!(identity.claim("team"), Some("platform"));
        assert_eq!(identity.claim("role"), None);
    }

    #[test]
    fn test_service_identity_parse() {
        let identity = ServiceIdentity::parse("spiffe://prod.mesh/ns/payments").unwrap();

        assert_eq!(identity.name, "payments");
        assert_eq!(identity.trust_domain, "prod.mesh");
        assert_eq!(identity.uri, "spiffe://prod.mesh/ns/payments");
    }
}
