//! SPIFFE Identity Propagation for gRPC Microservices
//!
//! Authenticates callers by their SVID, authorizes them against a policy,
//! and carries caller lineage (original caller, call chain, request ID)
//! across service hops as gRPC metadata.
//!
//! ## Core Components
//!
//! - **AuthInterceptor**: peer certificate → `AuthenticatedIdentity` → policy decision
//! - **PropagationServerInterceptor**: inbound metadata → `PropagatedIdentity`
//! - **ServerInterceptor**: both of the above, driven by `InterceptorConfig`
//! - **IdentityPropagationInterceptor**: stamps outbound calls, extending the call chain
//! - **IdentityExt**: request extension trait for handlers
//! - **MethodPathLayer**: tower layer exposing the method path to server interceptors
//!
//! ## Loop Prevention
//!
//! Every hop appends its identity to `x-ephemos-call-chain`. A service that
//! finds itself already in the chain refuses the outbound call
//! (`PermissionDenied`), as does any hop receiving a chain that already
//! reached the maximum depth (10 by default).
//!
//! ## Usage Example
//!
//! ### Server Side
//!
//! ```rust,no_run
//! use grpc_identity_propagation::{InterceptorConfig, MethodPathLayer, ServerInterceptor};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = InterceptorConfig::from_env()?;
//! let interceptor = ServerInterceptor::from_config(&config);
//!
//! // skip_methods and per-method logs need the request path
//! let builder = tonic::transport::Server::builder().layer(MethodPathLayer);
//! // builder.add_service(OrdersServer::with_interceptor(OrdersService, interceptor))
//! # Ok(())
//! # }
//! ```
//!
//! ### Client Side (inside a handler)
//!
//! ```rust,no_run
//! use grpc_identity_propagation::{IdentityExt, IdentityPropagationInterceptor};
//! use tonic::{Request, Response, Status};
//!
//! async fn place_order(
//!     outbound: &IdentityPropagationInterceptor,
//!     request: Request<()>,
//! ) -> Result<Response<()>, Status> {
//!     let caller = request.require_identity()?;
//!     tracing::info!(caller = %caller.spiffe_id, "Placing order");
//!
//!     let interceptor = outbound.bind(&request);
//!     // let mut payments = PaymentsClient::with_interceptor(channel, interceptor);
//!     Ok(Response::new(()))
//! }
//! ```

mod call_chain;
mod client;
mod config;
mod correlation;
mod error;
mod extensions;
mod layer;
pub mod metadata;
mod metrics;
mod policy;
mod propagated;
mod server;
pub mod testing;

pub use call_chain::{
    CallChain, CallChainPropagator, CALL_CHAIN_DELIMITER, DEFAULT_MAX_CALL_CHAIN_DEPTH,
};
pub use client::{IdentityPropagationInterceptor, InboundContext};
pub use config::{AuthConfig, InterceptorConfig, PropagationConfig};
pub use correlation::{
    Clock, IdGenerator, RequestCorrelator, SystemClock, UuidIdGenerator, REQUEST_ID_PREFIX,
};
pub use error::{AuthError, AuthorizationDenial, ConfigError, PropagationError};
pub use extensions::IdentityExt;
pub use layer::{MethodPath, MethodPathLayer, MethodPathService};
pub use metrics::{MetricsCollector, NoopMetricsCollector, PrometheusMetricsCollector};
pub use policy::{matches_pattern, AuthorizationPolicy, PolicyMode};
pub use propagated::PropagatedIdentity;
pub use server::{AuthInterceptor, PeerCertificate, PropagationServerInterceptor, ServerInterceptor};

// Re-export identity types handlers see in extensions
pub use spiffe_identity::{AuthenticatedIdentity, ServiceIdentity};
pub use tonic::Status;
