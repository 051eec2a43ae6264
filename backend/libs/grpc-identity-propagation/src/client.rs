//! Client-side identity propagation interceptor
//!
//! Stamps every outgoing call with the local service identity, correlation
//! data and the extended call chain.

use crate::call_chain::CallChainPropagator;
use crate::config::PropagationConfig;
use crate::correlation::RequestCorrelator;
use crate::error::{ConfigError, PropagationError};
use crate::metadata::{self, get_str, grpc_method, is_reserved_key, merge_metadata};
use crate::metrics::{MetricsCollector, NoopMetricsCollector};
use spiffe_identity::IdentityProvider;
use std::fmt;
use std::sync::Arc;
use tonic::metadata::{
    AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, BinaryMetadataValue, MetadataMap,
};
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::{debug, warn};

/// Snapshot of the inbound call an outbound call is made on behalf of
#[derive(Debug, Clone, Default)]
pub struct InboundContext {
    pub original_caller: Option<String>,
    pub call_chain: Option<String>,
    pub request_id: Option<String>,
    forwarded_headers: Vec<(AsciiMetadataKey, AsciiMetadataValue)>,
    forwarded_binary_headers: Vec<(BinaryMetadataKey, BinaryMetadataValue)>,
}

impl InboundContext {
    /// Capture propagation keys plus the listed custom headers
    ///
    /// Custom header names are lower-cased. Names ending in `-bin` are
    /// forwarded as binary metadata. Names that collide with the reserved
    /// `x-ephemos-*` keys or are not valid metadata keys are skipped.
    pub fn from_metadata(inbound: &MetadataMap, custom_headers: &[String]) -> Self {
        let non_empty = |key| {
            get_str(inbound, key)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string)
        };

        let mut forwarded_headers = Vec::new();
        let mut forwarded_binary_headers = Vec::new();
        for name in custom_headers {
            let name = name.to_ascii_lowercase();
            if is_reserved_key(&name) {
                warn!(header = %name, "Custom header collides with a propagation key, skipping");
                continue;
            }
            if name.ends_with("-bin") {
                let Ok(key) = BinaryMetadataKey::from_bytes(name.as_bytes()) else {
                    warn!(header = %name, "Invalid custom header name, skipping");
                    continue;
                };
                for value in inbound.get_all_bin(key.as_str()).iter() {
                    forwarded_binary_headers.push((key.clone(), value.clone()));
                }
                continue;
            }
            let Ok(key) = AsciiMetadataKey::from_bytes(name.as_bytes()) else {
                warn!(header = %name, "Invalid custom header name, skipping");
                continue;
            };
            for value in inbound.get_all(key.as_str()).iter() {
                forwarded_headers.push((key.clone(), value.clone()));
            }
        }

        Self {
            original_caller: non_empty(metadata::ORIGINAL_CALLER),
            call_chain: non_empty(metadata::CALL_CHAIN),
            request_id: non_empty(metadata::REQUEST_ID),
            forwarded_headers,
            forwarded_binary_headers,
        }
    }

    pub fn forwarded_headers(&self) -> &[(AsciiMetadataKey, AsciiMetadataValue)] {
        &self.forwarded_headers
    }

    pub fn forwarded_binary_headers(&self) -> &[(BinaryMetadataKey, BinaryMetadataValue)] {
        &self.forwarded_binary_headers
    }
}

/// Outbound interceptor that propagates identity and call lineage
///
/// An interceptor with no [`InboundContext`] treats every call as a first
/// hop: it mints a request ID and starts a new chain. Inside a handler,
/// [`bind`](Self::bind) the interceptor to the inbound request so the chain,
/// original caller and request ID carry over.
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_identity_propagation::IdentityPropagationInterceptor;
/// use spiffe_identity::StaticIdentityProvider;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = StaticIdentityProvider::from_uri("spiffe://example.org/orders")?;
/// let interceptor = IdentityPropagationInterceptor::new(provider);
///
/// // In a handler:
/// // let outbound = interceptor.bind(&request);
/// // let mut client = PaymentsClient::with_interceptor(channel, outbound);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IdentityPropagationInterceptor {
    provider: Arc<dyn IdentityProvider>,
    correlator: RequestCorrelator,
    metrics: Arc<dyn MetricsCollector>,
    config: Arc<PropagationConfig>,
    chain: CallChainPropagator,
    inbound: Option<Arc<InboundContext>>,
}

impl fmt::Debug for IdentityPropagationInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityPropagationInterceptor")
            .field("config", &self.config)
            .field("inbound", &self.inbound)
            .finish_non_exhaustive()
    }
}

impl IdentityPropagationInterceptor {
    pub fn new(provider: impl IdentityProvider + 'static) -> Self {
        let config = PropagationConfig::default();
        Self {
            provider: Arc::new(provider),
            correlator: RequestCorrelator::default(),
            metrics: Arc::new(NoopMetricsCollector),
            chain: CallChainPropagator::new(config.max_call_chain_depth),
            config: Arc::new(config),
            inbound: None,
        }
    }

    pub fn from_config(
        provider: impl IdentityProvider + 'static,
        config: PropagationConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chain: CallChainPropagator::new(config.max_call_chain_depth),
            config: Arc::new(config),
            ..Self::new(provider)
        })
    }

    pub fn with_correlator(mut self, correlator: RequestCorrelator) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub fn inbound(&self) -> Option<&InboundContext> {
        self.inbound.as_deref()
    }

    /// Copy of this interceptor bound to an inbound request
    pub fn bind<T>(&self, request: &Request<T>) -> Self {
        self.bind_metadata(request.metadata())
    }

    pub fn bind_metadata(&self, inbound: &MetadataMap) -> Self {
        let context = InboundContext::from_metadata(inbound, &self.config.custom_headers);
        Self {
            inbound: Some(Arc::new(context)),
            ..self.clone()
        }
    }

    /// Write propagation metadata into `outgoing`, returning the request ID
    ///
    /// All values are computed before anything is written: on error
    /// `outgoing` is left exactly as it was.
    ///
    /// ## Errors
    ///
    /// - `Identity` if the local identity is unavailable
    /// - `DepthLimitExceeded` / `CircularCall` from chain extension
    /// - `InvalidMetadata` if a value cannot be encoded as ASCII metadata
    pub fn propagate(
        &self,
        method: &str,
        outgoing: &mut MetadataMap,
    ) -> Result<String, PropagationError> {
        match self.build_metadata() {
            Ok((fresh, request_id, depth)) => {
                merge_metadata(outgoing, &fresh);

                if let Some(depth) = depth {
                    self.metrics.record_call_chain_depth(depth);
                }
                self.metrics.record_propagation_success(method, &request_id);
                debug!(
                    method = %method,
                    request_id = %request_id,
                    chain_depth = ?depth,
                    "Propagated identity to outbound call"
                );
                Ok(request_id)
            }
            Err(err) => {
                if let PropagationError::CircularCall { identity, .. } = &err {
                    self.metrics.record_circular_call_detected(identity);
                }
                self.metrics.record_propagation_failure(method, err.reason());
                warn!(method = %method, error = %err, "Identity propagation failed");
                Err(err)
            }
        }
    }

    fn build_metadata(&self) -> Result<(MetadataMap, String, Option<usize>), PropagationError> {
        let identity = self.provider.service_identity()?;
        let inbound = self.inbound.as_deref();

        let request_id = self
            .correlator
            .request_id(inbound.and_then(|ctx| ctx.request_id.as_deref()));

        let mut fresh = MetadataMap::new();
        insert_ascii(
            &mut fresh,
            metadata::TIMESTAMP,
            self.correlator.timestamp_millis().to_string(),
        )?;
        insert_ascii(&mut fresh, metadata::REQUEST_ID, request_id.clone())?;
        insert_ascii(&mut fresh, metadata::TRUST_DOMAIN, identity.trust_domain.clone())?;
        insert_ascii(&mut fresh, metadata::SERVICE_NAME, identity.name.clone())?;

        if self.config.propagate_original_caller {
            let original_caller = self.chain.original_caller(
                inbound.and_then(|ctx| ctx.original_caller.as_deref()),
                &identity.uri,
            );
            insert_ascii(&mut fresh, metadata::ORIGINAL_CALLER, original_caller)?;
        }

        let mut depth = None;
        if self.config.propagate_call_chain {
            let chain = self
                .chain
                .extend_chain(inbound.and_then(|ctx| ctx.call_chain.as_deref()), &identity.uri)?;
            depth = Some(chain.len());
            insert_ascii(
                &mut fresh,
                metadata::CALL_CHAIN,
                chain.serialize(self.chain.delimiter()),
            )?;
        }

        if let Some(ctx) = inbound {
            for (key, value) in ctx.forwarded_headers() {
                fresh.append(key.clone(), value.clone());
            }
            for (key, value) in ctx.forwarded_binary_headers() {
                fresh.append_bin(key.clone(), value.clone());
            }
        }

        Ok((fresh, request_id, depth))
    }
}

fn insert_ascii(
    md: &mut MetadataMap,
    key: &'static str,
    value: String,
) -> Result<(), PropagationError> {
    let value = AsciiMetadataValue::try_from(value).map_err(|_| {
        PropagationError::InvalidMetadata {
            key: key.to_string(),
        }
    })?;
    md.insert(key, value);
    Ok(())
}

impl Interceptor for IdentityPropagationInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let method = grpc_method(&request);
        self.propagate(&method, request.metadata_mut())?;
        Ok(request)
    }
}
