//! SPIFFE Workload Identity for gRPC Services
//!
//! Turns the verified peer certificate of a mutual-TLS handshake (or a
//! known identity URI) into a structured identity.
//!
//! ## Core Components
//!
//! - **SpiffeId**: parser for `spiffe://<trust-domain>/<path>` URIs
//! - **AuthenticatedIdentity**: the peer's identity as seen by handlers
//! - **identity_from_der / identity_from_pem**: certificate extraction
//! - **IdentityProvider**: capability returning the local service identity
//! - **dev_certs**: X.509-SVID generation for development and tests
//!
//! ## Trust Model
//!
//! Certificate chain validation is the transport's job. By the time a
//! certificate reaches this crate it has been verified against the trust
//! bundle; this crate only reads the identity out of it.
//!
//! ## Usage
//!
//! ```rust
//! use spiffe_identity::SpiffeId;
//!
//! let id = SpiffeId::parse("spiffe://example.org/workload/test-service").unwrap();
//! assert_eq!(id.trust_domain(), "example.org");
//! assert_eq!(id.service_name(), "test-service");
//! ```

pub mod certificate;
pub mod dev_certs;
mod error;
mod identity;
mod provider;
mod spiffe_id;

pub use certificate::{identity_from_der, identity_from_pem};
pub use error::{IdentityError, IdentityResult};
pub use identity::{AuthenticatedIdentity, ServiceIdentity};
pub use provider::{CertificateIdentityProvider, IdentityProvider, StaticIdentityProvider};
pub use spiffe_id::{SpiffeId, SPIFFE_SCHEME};
