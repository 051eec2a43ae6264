//! Request extension trait for identity access
//!
//! Handlers read what the server interceptors stored without touching
//! `extensions()` directly.

use crate::propagated::PropagatedIdentity;
use spiffe_identity::AuthenticatedIdentity;
use tonic::{Request, Status};

/// Accessors for identities stored by the server interceptors
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_identity_propagation::IdentityExt;
/// use tonic::{Request, Response, Status};
///
/// async fn charge(request: Request<()>) -> Result<Response<()>, Status> {
///     let caller = request.require_identity()?;
///     tracing::info!(service = %caller.service_name, "Charging on behalf of caller");
///
///     if let Some(propagated) = request.propagated_identity() {
///         tracing::debug!(request_id = ?propagated.request_id, "Propagated context");
///     }
///
///     Ok(Response::new(()))
/// }
/// ```
pub trait IdentityExt {
    /// Identity set by `AuthInterceptor`, if the call was authenticated
    fn authenticated_identity(&self) -> Option<&AuthenticatedIdentity>;

    /// Like [`authenticated_identity`](Self::authenticated_identity), but
    /// `Status::unauthenticated` when absent
    fn require_identity(&self) -> Result<&AuthenticatedIdentity, Status>;

    /// Lineage data set by `PropagationServerInterceptor`
    fn propagated_identity(&self) -> Option<&PropagatedIdentity>;
}

impl<T> IdentityExt for Request<T> {
    fn authenticated_identity(&self) -> Option<&AuthenticatedIdentity> {
        self.extensions().get::<AuthenticatedIdentity>()
    }

    fn require_identity(&self) -> Result<&AuthenticatedIdentity, Status> {
        self.authenticated_identity()
            .ok_or_else(|| Status::unauthenticated("no authenticated identity"))
    }

    fn propagated_identity(&self) -> Option<&PropagatedIdentity> {
        self.extensions().get::<PropagatedIdentity>()
    }
}
