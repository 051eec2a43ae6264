//! Error taxonomy and `tonic::Status` mapping
//!
//! | Error | Status |
//! |-------|--------|
//! | missing / unparsable peer certificate | `Unauthenticated` |
//! | identity provider failure | `Unauthenticated` |
//! | policy denial, depth limit, circular call | `PermissionDenied` |
//! | metadata value not ASCII | `Internal` |
//!
//! None of these are retryable: the same inputs reproduce the same error.

use spiffe_identity::IdentityError;
use thiserror::Error;
use tonic::Status;

/// Why the authorization policy rejected an identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationDenial {
    /// Allow-list mode and the identity matched no pattern
    #[error("service {identity} is not authorized")]
    NotAuthorized { identity: String },

    /// Deny-list mode and the identity matched a pattern
    #[error("service {identity} is denied access")]
    ExplicitlyDenied { identity: String },

    #[error("missing required claim: {key}")]
    MissingClaim { key: String },

    #[error("claim {key} does not match the required value")]
    ClaimMismatch { key: String },
}

/// Inbound authentication/authorization failure
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no verified peer certificate presented")]
    MissingPeerCertificate,

    #[error("invalid certificate identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    #[error(transparent)]
    Denied(#[from] AuthorizationDenial),
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPeerCertificate => {
                Status::unauthenticated("no peer certificates provided")
            }
            // Parser details stay in the logs
            AuthError::InvalidIdentity(_) => Status::unauthenticated("invalid certificate identity"),
            AuthError::Denied(denial) => Status::permission_denied(denial.to_string()),
        }
    }
}

/// Outbound propagation failure
#[derive(Debug, Error)]
pub enum PropagationError {
    /// The inbound chain already reached the ceiling before extension
    #[error("call chain depth limit exceeded: chain length {depth} reaches max {max_depth}")]
    DepthLimitExceeded { depth: usize, max_depth: usize },

    /// The current identity already appears in the inbound chain
    #[error("circular call detected: {identity} already at position {position} in call chain")]
    CircularCall { identity: String, position: usize },

    #[error("get service identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("invalid metadata value for {key}")]
    InvalidMetadata { key: String },
}

impl PropagationError {
    pub fn is_depth_limit(&self) -> bool {
        matches!(self, Self::DepthLimitExceeded { .. })
    }

    pub fn is_circular_call(&self) -> bool {
        matches!(self, Self::CircularCall { .. })
    }

    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DepthLimitExceeded { .. } => "max_depth_exceeded",
            Self::CircularCall { .. } => "circular_call",
            Self::Identity(_) => "identity_unavailable",
            Self::InvalidMetadata { .. } => "invalid_metadata",
        }
    }
}

impl From<PropagationError> for Status {
    fn from(err: PropagationError) -> Self {
        match &err {
            PropagationError::DepthLimitExceeded { .. } | PropagationError::CircularCall { .. } => {
                Status::permission_denied(err.to_string())
            }
            PropagationError::Identity(_) => Status::unauthenticated(err.to_string()),
            PropagationError::InvalidMetadata { .. } => Status::internal(err.to_string()),
        }
    }
}

/// Invalid configuration value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    #[error("max_call_chain_depth must be at least 1")]
    ZeroMaxDepth,
}
