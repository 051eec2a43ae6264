//! Wire keys and metadata helpers
//!
//! Identity and lineage data travel as ASCII gRPC metadata under fixed
//! `x-ephemos-*` keys.

use crate::layer::MethodPath;
use tonic::metadata::{KeyAndValueRef, KeyRef, MetadataMap};
use tonic::{GrpcMethod, Request};

/// Identity URI of the first hop
pub const ORIGINAL_CALLER: &str = "x-ephemos-original-caller";

/// Ordered identities joined by [`CALL_CHAIN_DELIMITER`](crate::CALL_CHAIN_DELIMITER)
pub const CALL_CHAIN: &str = "x-ephemos-call-chain";

/// Immediate caller's trust domain
pub const TRUST_DOMAIN: &str = "x-ephemos-trust-domain";

/// Immediate caller's service name
pub const SERVICE_NAME: &str = "x-ephemos-service-name";

/// Correlation ID (`req-<hex>`)
pub const REQUEST_ID: &str = "x-ephemos-request-id";

/// Sender wall-clock time, decimal milliseconds since epoch
pub const TIMESTAMP: &str = "x-ephemos-timestamp";

pub const PROPAGATION_KEYS: [&str; 6] = [
    ORIGINAL_CALLER,
    CALL_CHAIN,
    TRUST_DOMAIN,
    SERVICE_NAME,
    REQUEST_ID,
    TIMESTAMP,
];

/// Whether `key` is one of the propagation keys (case-insensitive)
pub fn is_reserved_key(key: &str) -> bool {
    PROPAGATION_KEYS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(key))
}

/// First value of an ASCII key, if present and printable
pub fn get_str<'a>(metadata: &'a MetadataMap, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|value| value.to_str().ok())
}

/// Merge freshly computed metadata into metadata attached by other layers
///
/// Keys present in `fresh` replace every existing value for that key; all
/// other existing keys are kept untouched.
pub fn merge_metadata(target: &mut MetadataMap, fresh: &MetadataMap) {
    for key in fresh.keys() {
        match key {
            KeyRef::Ascii(key) => {
                target.remove(key.as_str());
            }
            KeyRef::Binary(key) => {
                target.remove_bin(key.as_str());
            }
        }
    }

    for entry in fresh.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                target.append(key.clone(), value.clone());
            }
            KeyAndValueRef::Binary(key, value) => {
                target.append_bin(key.clone(), value.clone());
            }
        }
    }
}

/// `/package.Service/Method` from the server-side [`MethodPath`] or the
/// client-side `GrpcMethod`, `"unknown"` otherwise
pub(crate) fn grpc_method<T>(request: &Request<T>) -> String {
    let extensions = request.extensions();
    if let Some(path) = extensions.get::<MethodPath>() {
        return path.0.clone();
    }

    extensions
        .get::<GrpcMethod>()
        .map(|m| format!("/{}/{}", m.service(), m.method()))
        .unwrap_or_else(|| "unknown".to_string())
}
