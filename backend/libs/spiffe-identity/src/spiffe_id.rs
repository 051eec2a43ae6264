//! SPIFFE ID parsing
//!
//! A SPIFFE ID has the shape `spiffe://<trust-domain>/<workload path>`.
//! The workload path is kept verbatim: percent-encoding is not decoded and
//! `?` / `#` are ordinary path characters. The service name is the last
//! `/`-separated segment of that path.

use crate::error::{IdentityError, IdentityResult};
use std::fmt;
use std::str::FromStr;

/// Scheme prefix every identity URI must carry (case-sensitive)
pub const SPIFFE_SCHEME: &str = "spiffe://";

/// A parsed, structurally valid SPIFFE ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpiffeId {
    uri: String,
    trust_domain: String,
    path: String,
}

impl SpiffeId {
    /// Parse an identity URI
    ///
    /// ## Errors
    ///
    /// Returns `IdentityError::InvalidIdentity` if:
    /// - the string is empty or does not start with `spiffe://`
    /// - the trust domain is empty or contains characters outside
    ///   `[a-z0-9._-]`
    /// - the URI contains whitespace or control characters
    pub fn parse(value: &str) -> IdentityResult<Self> {
        if value.is_empty() {
            return Err(IdentityError::invalid(value, "identity is empty"));
        }

        let rest = value
            .strip_prefix(SPIFFE_SCHEME)
            .ok_or_else(|| IdentityError::invalid(value, "scheme must be spiffe://"))?;

        if value
            .chars()
            .any(|c| c.is_ascii_whitespace() || c.is_control())
        {
            return Err(IdentityError::invalid(
                value,
                "identity contains whitespace or control characters",
            ));
        }

        let (trust_domain, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        if trust_domain.is_empty() {
            return Err(IdentityError::invalid(value, "trust domain is empty"));
        }

        if let Some(bad) = trust_domain.chars().find(|c| !is_trust_domain_char(*c)) {
            return Err(IdentityError::invalid(
                value,
                format!("trust domain contains invalid character {:?}", bad),
            ));
        }

        Ok(Self {
            uri: value.to_string(),
            trust_domain: trust_domain.to_string(),
            path: path.to_string(),
        })
    }

    /// Full identity URI, exactly as parsed
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    pub fn trust_domain(&self) -> &str {
        &self.trust_domain
    }

    /// Workload path including the leading `/`, or `""` when absent
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last segment of the workload path, taken literally
    ///
    /// `spiffe://example.org` and `spiffe://example.org/ns/` both yield `""`.
    pub fn service_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }
}

fn is_trust_domain_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_')
}

impl FromStr for SpiffeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl AsRef<str> for SpiffeId {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}
