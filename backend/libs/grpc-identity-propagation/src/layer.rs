//! Tower layer exposing the gRPC method path to server interceptors
//!
//! Tonic interceptors only see metadata and extensions, never the request
//! URI, and tonic's server codegen does not record a `GrpcMethod`. Wrap the
//! server with [`MethodPathLayer`] so `skip_methods`, logs and metrics see
//! the real `/package.Service/Method` path:
//!
//! ```rust,no_run
//! use grpc_identity_propagation::MethodPathLayer;
//!
//! let builder = tonic::transport::Server::builder().layer(MethodPathLayer);
//! ```

use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Request path recorded by [`MethodPathLayer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPath(pub String);

#[derive(Debug, Clone, Copy, Default)]
pub struct MethodPathLayer;

impl<S> Layer<S> for MethodPathLayer {
    type Service = MethodPathService<S>;

    fn layer(&self, service: S) -> Self::Service {
        MethodPathService { inner: service }
    }
}

#[derive(Debug, Clone)]
pub struct MethodPathService<S> {
    inner: S,
}

impl<S, B> Service<http::Request<B>> for MethodPathService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let path = MethodPath(req.uri().path().to_string());
        req.extensions_mut().insert(path);
        self.inner.call(req)
    }
}
