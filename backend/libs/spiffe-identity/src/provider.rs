//! Local identity capability
//!
//! The current service identity is process-wide and read-only after
//! startup, but it is passed around as an injected capability so tests can
//! substitute a fixed identity.

use crate::certificate::identity_from_pem;
use crate::error::{IdentityError, IdentityResult};
use crate::identity::ServiceIdentity;
use crate::spiffe_id::SpiffeId;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Returns the current process's own identity
pub trait IdentityProvider: Send + Sync {
    fn service_identity(&self) -> IdentityResult<ServiceIdentity>;
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for Arc<P> {
    fn service_identity(&self) -> IdentityResult<ServiceIdentity> {
        (**self).service_identity()
    }
}

/// Fixed identity, validated once at construction
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    identity: ServiceIdentity,
}

impl StaticIdentityProvider {
    /// ## Errors
    ///
    /// Returns `IdentityError::InvalidIdentity` if `uri` is not a SPIFFE ID.
    pub fn from_uri(uri: &str) -> IdentityResult<Self> {
        let id = SpiffeId::parse(uri)?;
        Ok(Self {
            identity: ServiceIdentity::from_spiffe_id(&id),
        })
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn service_identity(&self) -> IdentityResult<ServiceIdentity> {
        Ok(self.identity.clone())
    }
}

/// Reads the process's own SVID from disk on every call
///
/// Re-reading keeps the identity current when the rotation subsystem
/// replaces the certificate file in place.
#[derive(Debug, Clone)]
pub struct CertificateIdentityProvider {
    cert_path: PathBuf,
}

impl CertificateIdentityProvider {
    pub fn new(cert_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
        }
    }

    /// Load the SVID path from `EPHEMOS_SVID_CERT_PATH`
    pub fn from_env() -> Option<Self> {
        std::env::var("EPHEMOS_SVID_CERT_PATH").ok().map(Self::new)
    }
}

impl IdentityProvider for CertificateIdentityProvider {
    fn service_identity(&self) -> IdentityResult<ServiceIdentity> {
        let cert_pem = fs::read_to_string(&self.cert_path).map_err(|e| IdentityError::Provider {
            path: self.cert_path.clone(),
            source: e,
        })?;

        let identity = identity_from_pem(&cert_pem, Utc::now())?;

        Ok(ServiceIdentity {
            name: identity.service_name,
            trust_domain: identity.trust_domain,
            uri: identity.spiffe_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev_certs::generate_svid;

    #[test]
    fn test_static_provider() {
        let provider = StaticIdentityProvider::from_uri("spiffe://example.org/api").unwrap();
        let identity = provider.service_identity().unwrap();

        assert_eq!(identity.name, "api");
        assert_eq!(identity.trust_domain, "example.org");
        assert_eq!(identity.uri, "spiffe://example.org/api");
    }

    #[test]
    fn test_static_provider_rejects_invalid_uri() {
        assert!(StaticIdentityProvider::from_uri("http://example.org/api").is_err());
    }

    #[test]
    fn test_certificate_provider_reads_svid() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("svid.crt");
        let svid = generate_svid(&["spiffe://example.org/ns/billing"]).unwrap();
        fs::write(&path, &svid.cert_pem).unwrap();

        let provider = CertificateIdentityProvider::new(&path);
        let identity = provider.service_identity().unwrap();

        assert_eq!(identity.name, "billing");
        assert_eq!(identity.uri, "spiffe://example.org/ns/billing");
    }

    #[test]
    fn test_certificate_provider_missing_file() {
        let provider = CertificateIdentityProvider::new("/nonexistent/svid.crt");

        match provider.service_identity() {
            Err(IdentityError::Provider { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/svid.crt"));
            }
            other => panic!("Expected Provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_arc_provider() {
        let provider: Arc<dyn IdentityProvider> =
            Arc::new(StaticIdentityProvider::from_uri("spiffe://example.org/api").unwrap());

        assert_eq!(provider.service_identity().unwrap().name, "api");
    }
}
