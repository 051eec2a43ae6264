//! Identity error types

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout this crate
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors raised while turning certificates or URIs into identities
///
/// Every variant means "the caller could not be authenticated". The
/// interceptor layer maps all of them to `Unauthenticated`.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity URI is not a well-formed SPIFFE ID
    #[error("invalid identity {value:?}: {reason}")]
    InvalidIdentity { value: String, reason: String },

    /// The certificate could not be decoded or carries no usable identity
    #[error("invalid certificate: {reason}")]
    InvalidCertificate { reason: String },

    /// The local identity source could not be read
    #[error("failed to read identity from {path:?}: {source}")]
    Provider {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IdentityError {
    pub(crate) fn invalid(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn certificate(reason: impl Into<String>) -> Self {
        Self::InvalidCertificate {
            reason: reason.into(),
        }
    }
}

impl From<::pem::PemError> for IdentityError {
    fn from(e: ::pem::PemError) -> Self {
        Self::certificate(format!("PEM decode failed: {}", e))
    }
}
