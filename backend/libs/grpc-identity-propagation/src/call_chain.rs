//! Call-chain propagation with cycle and depth detection
//!
//! The chain is an append-only list of identity URIs carried entirely on
//! the wire, so loop prevention needs no shared registry across processes:
//! every hop re-parses the inbound chain, scans it for itself, and appends.
//!
//! Invariants of every chain this module emits:
//! - no identity URI appears twice
//! - length never exceeds the configured maximum depth

use crate::error::PropagationError;

/// Separator between hops on the wire
pub const CALL_CHAIN_DELIMITER: &str = " -> ";

pub const DEFAULT_MAX_CALL_CHAIN_DEPTH: usize = 10;

/// Ordered identity URIs a request has traversed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallChain {
    hops: Vec<String>,
}

impl CallChain {
    /// Chain whose only hop is `first`
    pub fn start(first: impl Into<String>) -> Self {
        Self {
            hops: vec![first.into()],
        }
    }

    /// Split a serialized chain on `delimiter`
    pub fn parse(serialized: &str, delimiter: &str) -> Self {
        Self {
            hops: serialized.split(delimiter).map(str::to_string).collect(),
        }
    }

    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn position(&self, identity: &str) -> Option<usize> {
        self.hops.iter().position(|hop| hop == identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.position(identity).is_some()
    }

    /// First hop, i.e. the identity that initiated the request
    pub fn origin(&self) -> Option<&str> {
        self.hops.first().map(String::as_str)
    }

    pub fn serialize(&self, delimiter: &str) -> String {
        self.hops.join(delimiter)
    }
}

/// Validates and extends inbound call chains
///
/// Pure: the same `(inbound, current)` pair always yields the same chain or
/// the same error.
#[derive(Debug, Clone)]
pub struct CallChainPropagator {
    max_depth: usize,
    delimiter: String,
}

impl Default for CallChainPropagator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALL_CHAIN_DEPTH)
    }
}

impl CallChainPropagator {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            delimiter: CALL_CHAIN_DELIMITER.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Extend the inbound chain with the current identity
    ///
    /// An absent or blank inbound chain starts a new chain. The depth check
    /// runs against the inbound chain before extension, so a chain that
    /// already reached `max_depth` can never grow.
    ///
    /// ## Errors
    ///
    /// - `DepthLimitExceeded` if the inbound chain has `max_depth` or more hops
    /// - `CircularCall` if `current` already appears anywhere in the chain
    ///   (including a service calling itself)
    pub fn extend_chain(
        &self,
        inbound: Option<&str>,
        current: &str,
    ) -> Result<CallChain, PropagationError> {
        let Some(serialized) = inbound.filter(|s| !s.trim().is_empty()) else {
            return Ok(CallChain::start(current));
        };

        let mut chain = CallChain::parse(serialized, &self.delimiter);

        if chain.len() >= self.max_depth {
            return Err(PropagationError::DepthLimitExceeded {
                depth: chain.len(),
                max_depth: self.max_depth,
            });
        }

        if let Some(position) = chain.position(current) {
            return Err(PropagationError::CircularCall {
                identity: current.to_string(),
                position,
            });
        }

        chain.hops.push(current.to_string());
        Ok(chain)
    }

    /// [`extend_chain`](Self::extend_chain), serialized for the wire
    pub fn extend(&self, inbound: Option<&str>, current: &str) -> Result<String, PropagationError> {
        self.extend_chain(inbound, current)
            .map(|chain| chain.serialize(&self.delimiter))
    }

    /// Preserve the inbound original caller, or claim the role for `current`
    pub fn original_caller(&self, inbound: Option<&str>, current: &str) -> String {
        inbound
            .filter(|caller| !caller.is_empty())
            .unwrap_or(current)
            .to_string()
    }
}
