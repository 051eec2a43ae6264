//! Propagated identity reconstructed from inbound metadata

use crate::call_chain::{CallChain, CALL_CHAIN_DELIMITER};
use crate::metadata::{self, get_str};
use serde::{Deserialize, Serialize};
use tonic::metadata::MetadataMap;

/// Lineage and correlation data carried by an inbound call
///
/// Every field is optional; a field is absent when the key was missing,
/// empty, or (for the timestamp) not a decimal integer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_caller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_trust_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Sender wall-clock time, milliseconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl PropagatedIdentity {
    /// `None` when none of the propagation keys carry a value
    pub fn from_metadata(metadata: &MetadataMap) -> Option<Self> {
        let field = |key| {
            get_str(metadata, key)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let identity = Self {
            original_caller: field(metadata::ORIGINAL_CALLER),
            call_chain: field(metadata::CALL_CHAIN),
            caller_trust_domain: field(metadata::TRUST_DOMAIN),
            caller_service: field(metadata::SERVICE_NAME),
            request_id: field(metadata::REQUEST_ID),
            timestamp: get_str(metadata, metadata::TIMESTAMP).and_then(|ts| ts.parse().ok()),
        };

        if identity.is_empty() {
            None
        } else {
            Some(identity)
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn call_chain_hops(&self) -> Vec<String> {
        self.call_chain
            .as_deref()
            .map(|chain| CallChain::parse(chain, CALL_CHAIN_DELIMITER).hops().to_vec())
            .unwrap_or_default()
    }

    pub fn call_chain_depth(&self) -> usize {
        self.call_chain_hops().len()
    }
}
