//! Server-side interceptors
//!
//! [`AuthInterceptor`] turns the verified peer certificate into an
//! [`AuthenticatedIdentity`] and applies the authorization policy.
//! [`PropagationServerInterceptor`] lifts propagated metadata into a
//! [`PropagatedIdentity`]. [`ServerInterceptor`] runs both in that order.

use crate::config::{AuthConfig, InterceptorConfig};
use crate::correlation::{Clock, SystemClock};
use crate::error::AuthError;
use crate::metadata::grpc_method;
use crate::metrics::{MetricsCollector, NoopMetricsCollector};
use crate::policy::AuthorizationPolicy;
use crate::propagated::PropagatedIdentity;
use spiffe_identity::{identity_from_der, AuthenticatedIdentity};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::{debug, info, warn};

/// DER-encoded, already-verified leaf certificate of the peer
///
/// Transports that terminate TLS outside tonic (or tests) insert this into
/// the request extensions. It takes precedence over `Request::peer_certs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate(pub Vec<u8>);

fn peer_certificate<T>(request: &Request<T>) -> Option<Vec<u8>> {
    if let Some(cert) = request.extensions().get::<PeerCertificate>() {
        return Some(cert.0.clone());
    }

    request.peer_certs().and_then(|certs| {
        certs.first().map(|cert| {
            let der: &[u8] = cert.as_ref();
            der.to_vec()
        })
    })
}

/// Authenticates the peer certificate and enforces the authorization policy
///
/// ## Behavior
///
/// - Methods listed in `skip_methods` pass through untouched; on a tonic
///   server this needs [`MethodPathLayer`](crate::MethodPathLayer)
/// - A missing certificate fails with `Unauthenticated` unless
///   authentication is optional, in which case the call proceeds without
///   an identity
/// - A present certificate is always parsed and authorized, even when
///   authentication is optional
/// - On success the identity is stored in the request extensions
#[derive(Clone)]
pub struct AuthInterceptor {
    policy: Arc<AuthorizationPolicy>,
    require_authentication: bool,
    skip_methods: Arc<HashSet<String>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsCollector>,
}

impl fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("policy", &self.policy)
            .field("require_authentication", &self.require_authentication)
            .field("skip_methods", &self.skip_methods)
            .finish_non_exhaustive()
    }
}

impl AuthInterceptor {
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            require_authentication: true,
            skip_methods: Arc::new(HashSet::new()),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoopMetricsCollector),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.policy())
            .with_require_authentication(config.require_authentication)
            .with_skip_methods(config.skip_methods.iter().cloned())
    }

    pub fn with_require_authentication(mut self, required: bool) -> Self {
        self.require_authentication = required;
        self
    }

    pub fn with_skip_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_methods = Arc::new(methods.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    pub fn should_skip(&self, method: &str) -> bool {
        self.skip_methods.contains(method)
    }

    /// Authenticate and authorize a peer certificate
    ///
    /// `Ok(None)` only when no certificate was presented and authentication
    /// is optional.
    pub fn authenticate(
        &self,
        peer_der: Option<&[u8]>,
    ) -> Result<Option<AuthenticatedIdentity>, AuthError> {
        let Some(der) = peer_der else {
            if self.require_authentication {
                return Err(AuthError::MissingPeerCertificate);
            }
            return Ok(None);
        };

        let identity = identity_from_der(der, self.clock.now())?;
        self.policy.evaluate(&identity)?;
        Ok(Some(identity))
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let method = grpc_method(&request);

        if self.should_skip(&method) {
            debug!(method = %method, "Skipping authentication for method");
            self.metrics.record_authentication("skipped");
            return Ok(request);
        }

        let peer_der = peer_certificate(&request);
        match self.authenticate(peer_der.as_deref()) {
            Ok(Some(identity)) => {
                info!(
                    spiffe_id = %identity.spiffe_id,
                    service = %identity.service_name,
                    method = %method,
                    "Client authenticated successfully"
                );
                self.metrics.record_authentication("success");
                request.extensions_mut().insert(identity);
                Ok(request)
            }
            Ok(None) => {
                debug!(method = %method, "No peer certificate, authentication optional");
                self.metrics.record_authentication("anonymous");
                Ok(request)
            }
            Err(err) => {
                let result = match &err {
                    AuthError::MissingPeerCertificate => "missing_certificate",
                    AuthError::InvalidIdentity(_) => "invalid_identity",
                    AuthError::Denied(_) => "denied",
                };
                warn!(method = %method, error = %err, "Authentication failed");
                self.metrics.record_authentication(result);
                Err(err.into())
            }
        }
    }
}

/// Extracts propagated identity metadata; never rejects a call
#[derive(Clone)]
pub struct PropagationServerInterceptor {
    metrics: Arc<dyn MetricsCollector>,
}

impl fmt::Debug for PropagationServerInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationServerInterceptor").finish_non_exhaustive()
    }
}

impl Default for PropagationServerInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl PropagationServerInterceptor {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(NoopMetricsCollector),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Interceptor for PropagationServerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let Some(propagated) = PropagatedIdentity::from_metadata(request.metadata()) else {
            return Ok(request);
        };

        let method = grpc_method(&request);
        let request_id = propagated.request_id.clone().unwrap_or_default();

        debug!(
            method = %method,
            request_id = %request_id,
            original_caller = ?propagated.original_caller,
            chain_depth = propagated.call_chain_depth(),
            "Extracted propagated identity"
        );
        self.metrics.record_extraction_success(&method, &request_id);
        if propagated.call_chain.is_some() {
            self.metrics.record_call_chain_depth(propagated.call_chain_depth());
        }

        request.extensions_mut().insert(propagated);
        Ok(request)
    }
}

/// Authentication followed by propagation extraction
///
/// Either stage can be disabled through [`InterceptorConfig`].
#[derive(Debug, Clone)]
pub struct ServerInterceptor {
    auth: Option<AuthInterceptor>,
    propagation: Option<PropagationServerInterceptor>,
}

impl ServerInterceptor {
    pub fn new(
        auth: Option<AuthInterceptor>,
        propagation: Option<PropagationServerInterceptor>,
    ) -> Self {
        Self { auth, propagation }
    }

    pub fn from_config(config: &InterceptorConfig) -> Self {
        Self {
            auth: config
                .enable_auth
                .then(|| AuthInterceptor::from_config(&config.auth)),
            propagation: config
                .enable_identity_propagation
                .then(PropagationServerInterceptor::new),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.auth = self
            .auth
            .map(|auth| auth.with_metrics(Arc::clone(&metrics)));
        self.propagation = self
            .propagation
            .map(|propagation| propagation.with_metrics(Arc::clone(&metrics)));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.auth = self.auth.map(|auth| auth.with_clock(clock));
        self
    }
}

impl Interceptor for ServerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(auth) = self.auth.as_mut() {
            request = auth.call(request)?;
        }
        if let Some(propagation) = self.propagation.as_mut() {
            request = propagation.call(request)?;
        }
        Ok(request)
    }
}
