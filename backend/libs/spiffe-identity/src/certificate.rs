//! Identity extraction from verified peer certificates
//!
//! The transport has already completed the mutual handshake; this module
//! only reads the SPIFFE ID out of the leaf certificate. An X.509-SVID
//! carries exactly one URI Subject Alternative Name.

use crate::error::{IdentityError, IdentityResult};
use crate::identity::AuthenticatedIdentity;
use crate::spiffe_id::SpiffeId;
use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

/// Collect every URI SAN of a DER certificate
pub fn extract_uri_sans(der: &[u8]) -> IdentityResult<Vec<String>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| IdentityError::certificate(format!("X.509 parse failed: {}", e)))?;

    let mut uris = Vec::new();

    let san_ext = cert.subject_alternative_name().map_err(|e| {
        IdentityError::certificate(format!("invalid subjectAltName extension: {}", e))
    })?;

    if let Some(san_ext) = san_ext {
        for name in &san_ext.value.general_names {
            if let GeneralName::URI(uri) = name {
                uris.push(uri.to_string());
            }
        }
    }

    Ok(uris)
}

/// Read the SPIFFE ID out of a DER certificate
///
/// ## Errors
///
/// - `InvalidCertificate` if the DER does not parse
/// - `InvalidIdentity` if there is not exactly one URI SAN, or it is not a
///   valid SPIFFE ID
pub fn spiffe_id_from_der(der: &[u8]) -> IdentityResult<SpiffeId> {
    let uris = extract_uri_sans(der)?;

    match uris.as_slice() {
        [uri] => SpiffeId::parse(uri),
        [] => Err(IdentityError::invalid(
            "",
            "certificate contains no URI subject alternative name",
        )),
        _ => Err(IdentityError::invalid(
            &uris.join(", "),
            format!(
                "certificate contains {} URI subject alternative names, expected exactly one",
                uris.len()
            ),
        )),
    }
}

/// Build an `AuthenticatedIdentity` from a verified DER peer certificate
pub fn identity_from_der(
    der: &[u8],
    authenticated_at: DateTime<Utc>,
) -> IdentityResult<AuthenticatedIdentity> {
    let id = spiffe_id_from_der(der)?;

    tracing::debug!(
        spiffe_id = %id,
        trust_domain = %id.trust_domain(),
        "Extracted SPIFFE ID from peer certificate"
    );

    Ok(AuthenticatedIdentity::from_spiffe_id(&id, authenticated_at))
}

/// Build an `AuthenticatedIdentity` from the first certificate of a PEM bundle
pub fn identity_from_pem(
    cert_pem: &str,
    authenticated_at: DateTime<Utc>,
) -> IdentityResult<AuthenticatedIdentity> {
    let der = first_certificate_der(cert_pem)?;
    identity_from_der(&der, authenticated_at)
}

/// Decode the leaf (first) certificate of a PEM bundle
pub fn first_certificate_der(cert_pem: &str) -> IdentityResult<Vec<u8>> {
    let blocks = ::pem::parse_many(cert_pem.as_bytes())?;

    blocks
        .into_iter()
        .find(|block| block.tag() == "CERTIFICATE")
        .map(|block| block.into_contents())
        .ok_or_else(|| IdentityError::certificate("no CERTIFICATE block in PEM input"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev_certs::{generate_dev_svids, generate_svid};

    #[test]
    fn test_identity_from_pem() {
        let bundle = generate_dev_svids(
            "spiffe://example.org/workload/server",
            "spiffe://example.org/workload/client",
        )
        .unwrap();

        let identity = identity_from_pem(&bundle.client_cert, Utc::now()).unwrap();

        assert_eq!(identity.spiffe_id, "spiffe://example.org/workload/client");
        assert_eq!(identity.trust_domain, "example.org");
        assert_eq!(identity.service_name, "client");
        assert_eq!(identity.workload_path, "/workload/client");
    }

    #[test]
    fn test_identity_from_der() {
        let bundle = generate_dev_svids(
            "spiffe://example.org/server",
            "spiffe://example.org/ns/prod/sa/checkout",
        )
        .unwrap();
        let der = first_certificate_der(&bundle.client_cert).unwrap();

        let identity = identity_from_der(&der, Utc::now()).unwrap();
        assert_eq!(identity.service_name, "checkout");
    }

    #[test]
    fn test_certificate_without_uri_san() {
        let cert = generate_svid(&[]).unwrap();

        let result = identity_from_pem(&cert.cert_pem, Utc::now());
        assert!(matches!(
            result,
            Err(IdentityError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn test_certificate_with_multiple_uri_sans() {
        let cert = generate_svid(&["spiffe://example.org/a", "spiffe://example.org/b"]).unwrap();

        let result = identity_from_pem(&cert.cert_pem, Utc::now());
        assert!(matches!(
            result,
            Err(IdentityError::InvalidIdentity { ref value, .. }) if value.contains("example.org/b")
        ));
    }

    #[test]
    fn test_certificate_with_non_spiffe_uri() {
        let cert = generate_svid(&["https://example.org/a"]).unwrap();

        let result = identity_from_pem(&cert.cert_pem, Utc::now());
        assert!(matches!(result, Err(IdentityError::InvalidIdentity { .. })));
    }

    #[test]
    fn test_garbage_der() {
        let result = identity_from_der(b"not a certificate", Utc::now());
        assert!(matches!(
            result,
            Err(IdentityError::InvalidCertificate { .. })
        ));
    }

    #[test]
    fn test_pem_without_certificate_block() {
        let result = first_certificate_der("-----BEGIN FOO-----\nAAAA\n-----END FOO-----\n");
        assert!(result.is_err());
    }
}
