//! X.509-SVID generation for development and testing
//!
//! Produces a throwaway CA plus server/client leaf certificates whose only
//! URI SAN is a SPIFFE ID.
//! **WARNING**: NEVER use in production. Real SVIDs come from the workload API.

use anyhow::{Context, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, SanType,
};
use std::fs;
use std::path::Path;
use tracing::info;

/// A single certificate and its private key (PEM)
#[derive(Clone)]
pub struct SvidCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

/// CA, server and client SVIDs for local mTLS setups
#[derive(Clone)]
pub struct SvidBundle {
    /// Trust bundle (CA certificate, PEM)
    pub ca_cert: String,
    /// CA private key (PEM)
    pub ca_key: String,
    /// Server SVID signed by the CA (PEM)
    pub server_cert: String,
    /// Server private key (PEM)
    pub server_key: String,
    /// Client SVID signed by the CA (PEM)
    pub client_cert: String,
    /// Client private key (PEM)
    pub client_key: String,
}

fn leaf_params(common_name: &str, uris: &[&str]) -> Result<CertificateParams> {
    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params
        .distinguished_name
        .push(DnType::OrganizationName, "Ephemos Development");

    for uri in uris {
        params.subject_alt_names.push(SanType::URI(
            (*uri)
                .try_into()
                .with_context(|| format!("Failed to create URI SAN for {}", uri))?,
        ));
    }

    Ok(params)
}

/// Generate a self-signed certificate carrying the given URI SANs
///
/// Passing zero or several URIs produces deliberately non-conforming SVIDs,
/// which is what extraction tests need.
pub fn generate_svid(uris: &[&str]) -> Result<SvidCertificate> {
    let params = leaf_params("svid", uris)?;
    let key = KeyPair::generate()?;
    let cert = params
        .self_signed(&key)
        .context("Failed to self-sign SVID")?;

    Ok(SvidCertificate {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

/// Generate a CA plus server and client SVIDs (valid for rcgen's default period)
pub fn generate_dev_svids(server_id: &str, client_id: &str) -> Result<SvidBundle> {
    // 1. CA
    let mut ca_params = CertificateParams::default();
    ca_params.distinguished_name = DistinguishedName::new();
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "Ephemos Development CA");
    ca_params
        .distinguished_name
        .push(DnType::OrganizationName, "Ephemos Development");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let ca_key = KeyPair::generate()?;
    let ca_cert = ca_params
        .self_signed(&ca_key)
        .context("Failed to generate CA certificate")?;

    // 2. Server SVID; also valid as a TLS server cert for localhost
    let mut server_params = leaf_params("localhost", &[server_id])?;
    server_params.subject_alt_names.push(SanType::DnsName(
        "localhost"
            .try_into()
            .context("Failed to create SAN for localhost")?,
    ));
    let server_key = KeyPair::generate()?;
    let server_cert = server_params
        .signed_by(&server_key, &ca_cert, &ca_key)
        .context("Failed to sign server SVID")?;

    // 3. Client SVID
    let client_params = leaf_params("client", &[client_id])?;
    let client_key = KeyPair::generate()?;
    let client_cert = client_params
        .signed_by(&client_key, &ca_cert, &ca_key)
        .context("Failed to sign client SVID")?;

    info!(
        server_id = %server_id,
        client_id = %client_id,
        "Generated development SVIDs (CA, server, client)"
    );

    Ok(SvidBundle {
        ca_cert: ca_cert.pem(),
        ca_key: ca_key.serialize_pem(),
        server_cert: server_cert.pem(),
        server_key: server_key.serialize_pem(),
        client_cert: client_cert.pem(),
        client_key: client_key.serialize_pem(),
    })
}

/// Write an SVID bundle to `output_dir`
///
/// ```text
/// certs/
///   bundle.crt    (CA certificate)
///   ca.key        (CA private key)
///   server.crt / server.key
///   client.crt / client.key
/// ```
pub fn write_svid_bundle(bundle: &SvidBundle, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {:?}", output_dir))?;

    let files = [
        ("bundle.crt", &bundle.ca_cert),
        ("ca.key", &bundle.ca_key),
        ("server.crt", &bundle.server_cert),
        ("server.key", &bundle.server_key),
        ("client.crt", &bundle.client_cert),
        ("client.key", &bundle.client_key),
    ];

    for (name, contents) in files {
        fs::write(output_dir.join(name), contents)
            .with_context(|| format!("Failed to write {}", name))?;
    }

    info!(output_dir = ?output_dir, "SVID bundle written to disk");
    Ok(())
}
