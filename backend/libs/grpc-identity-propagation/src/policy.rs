//! Authorization policy evaluation
//!
//! Evaluation is a pure function of `(identity, policy)`: no hidden state,
//! idempotent, safe to call from any number of concurrent requests.

use crate::error::AuthorizationDenial;
use serde::{Deserialize, Serialize};
use spiffe_identity::AuthenticatedIdentity;
use std::collections::BTreeMap;

/// How the pattern list is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Only identities matching a pattern are admitted
    #[default]
    AllowList,
    /// Identities matching a pattern are rejected
    DenyList,
}

/// Identity patterns plus required claims
///
/// An empty pattern list means "no restriction" in either mode; only the
/// required claims are checked then.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    patterns: Vec<String>,
    mode: PolicyMode,
    required_claims: BTreeMap<String, String>,
}

impl AuthorizationPolicy {
    pub fn new<I, S>(patterns: I, mode: PolicyMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            mode,
            required_claims: BTreeMap::new(),
        }
    }

    /// No pattern restriction, no required claims
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn allow_list<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(patterns, PolicyMode::AllowList)
    }

    pub fn deny_list<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(patterns, PolicyMode::DenyList)
    }

    pub fn with_required_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required_claims.insert(key.into(), value.into());
        self
    }

    pub fn with_required_claims(mut self, claims: BTreeMap<String, String>) -> Self {
        self.required_claims = claims;
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn required_claims(&self) -> &BTreeMap<String, String> {
        &self.required_claims
    }

    /// Whether `identity` matches any pattern
    pub fn matches(&self, identity: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| matches_pattern(identity, pattern))
    }

    /// Decide whether `identity` is admitted
    ///
    /// Order: membership (skipped for an empty list), then mode, then
    /// required claims in key order.
    pub fn evaluate(&self, identity: &AuthenticatedIdentity) -> Result<(), AuthorizationDenial> {
        if !self.patterns.is_empty() {
            let listed = self.matches(&identity.spiffe_id);

            match self.mode {
                PolicyMode::DenyList if listed => {
                    return Err(AuthorizationDenial::ExplicitlyDenied {
                        identity: identity.spiffe_id.clone(),
                    });
                }
                PolicyMode::AllowList if !listed => {
                    return Err(AuthorizationDenial::NotAuthorized {
                        identity: identity.spiffe_id.clone(),
                    });
                }
                _ => {}
            }
        }

        self.validate_required_claims(identity)
    }

    fn validate_required_claims(
        &self,
        identity: &AuthenticatedIdentity,
    ) -> Result<(), AuthorizationDenial> {
        for (key, required) in &self.required_claims {
            match identity.claims.get(key) {
                None => {
                    return Err(AuthorizationDenial::MissingClaim { key: key.clone() });
                }
                Some(actual) if actual != required => {
                    return Err(AuthorizationDenial::ClaimMismatch { key: key.clone() });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Match an identity against a single-sided glob
///
/// - `"*"` alone matches everything, including `""`
/// - otherwise an empty identity or pattern never matches
/// - `"*suffix"` matches identities ending with `suffix`
/// - `"prefix*"` matches identities starting with `prefix`
/// - any other use of `*` never matches
/// - patterns without `*` require exact equality
pub fn matches_pattern(identity: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if identity.is_empty() || pattern.is_empty() {
        return false;
    }

    match pattern.matches('*').count() {
        0 => identity == pattern,
        1 => {
            if let Some(suffix) = pattern.strip_prefix('*') {
                identity.ends_with(suffix)
            } else if let Some(prefix) = pattern.strip_suffix('*') {
                identity.starts_with(prefix)
            } else {
                false
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const ALLOWED: &str = "spiffe://example.org/allowed-service";
    const DENIED: &str = "spiffe://example.org/denied-service";

    fn identity(uri: &str) -> AuthenticatedIdentity {
        AuthenticatedIdentity::parse(uri, Utc::now()).unwrap()
    }

    #[test]
    fn test_matches_pattern_exact() {
        assert!(matches_pattern(
            "spiffe://example.org/test-service",
            "spiffe://example.org/test-service"
        ));
        assert!(!matches_pattern(
            "spiffe://example.org/test-service",
            "spiffe://other.org/test-service"
        ));
    }

    #[test]
    fn test_matches_pattern_prefix_wildcard() {
        assert!(matches_pattern(
            "spiffe://example.org/test-service",
            "spiffe://example.org/*"
        ));
        assert!(!matches_pattern(
            "spiffe://other.org/test-service",
            "spiffe://example.org/*"
        ));
    }

    #[test]
    fn test_matches_pattern_suffix_wildcard() {
        assert!(matches_pattern("spiffe://example.org/test-service", "*test-service"));
        assert!(matches_pattern("spiffe://other.org/ns/test-service", "*test-service"));
        assert!(!matches_pattern("spiffe://example.org/test-service-v2", "*test-service"));
    }

    #[test]
    fn test_matches_pattern_star_matches_everything() {
        assert!(matches_pattern("spiffe://example.org/anything", "*"));
        assert!(matches_pattern("", "*"));
    }

    #[test]
    fn test_matches_pattern_empty_inputs() {
        assert!(!matches_pattern("", "spiffe://example.org/*"));
        assert!(!matches_pattern("", ""));
        assert!(!matches_pattern("spiffe://example.org/a", ""));
    }

    #[test]
    fn test_matches_pattern_middle_wildcard_never_matches() {
        assert!(!matches_pattern(
            "spiffe://example.org/ns/api",
            "spiffe://example.org/*/api"
        ));
        assert!(!matches_pattern("spiffe://example.org/*/api", "spiffe://example.org/*/api"));
        assert!(!matches_pattern("spiffe://example.org/api", "*example*"));
    }

    #[test]
    fn test_allow_list_mode() {
        let policy = AuthorizationPolicy::allow_list([ALLOWED]);

        assert!(policy.evaluate(&identity(ALLOWED)).is_ok());
        assert_eq!(
            policy.evaluate(&identity(DENIED)),
            Err(AuthorizationDenial::NotAuthorized {
                identity: DENIED.to_string()
            })
        );
    }

    #[test]
    fn test_deny_list_mode_blocks_members() {
        let policy = AuthorizationPolicy::deny_list([DENIED]);

        assert!(policy.evaluate(&identity(ALLOWED)).is_ok());
        assert_eq!(
            policy.evaluate(&identity(DENIED)),
            Err(AuthorizationDenial::ExplicitlyDenied {
                identity: DENIED.to_string()
            })
        );
    }

    #[test]
    fn test_deny_list_with_allowed_entry() {
        let policy = AuthorizationPolicy::deny_list([ALLOWED]);

        assert!(policy.evaluate(&identity(ALLOWED)).is_err());
        assert!(policy.evaluate(&identity(DENIED)).is_ok());
    }

    #[test]
    fn test_empty_list_is_unrestricted_in_both_modes() {
        let allow = AuthorizationPolicy::allow_list(Vec::<String>::new());
        let deny = AuthorizationPolicy::deny_list(Vec::<String>::new());

        assert!(allow.evaluate(&identity(DENIED)).is_ok());
        assert!(deny.evaluate(&identity(DENIED)).is_ok());
        assert!(AuthorizationPolicy::allow_all().evaluate(&identity(DENIED)).is_ok());
    }

    #[test]
    fn test_required_claims_extra_claims_ignored() {
        let policy = AuthorizationPolicy::allow_all()
            .with_required_claim("env", "prod")
            .with_required_claim("role", "service");

        let caller = identity(ALLOWED).with_claims([
            ("env", "prod"),
            ("role", "service"),
            ("team", "platform"),
        ]);

        assert!(policy.evaluate(&caller).is_ok());
    }

    #[test]
    fn test_required_claims_missing() {
        let policy = AuthorizationPolicy::allow_all()
            .with_required_claim("env", "prod")
            .with_required_claim("role", "service");

        let caller = identity(ALLOWED).with_claims([("env", "prod")]);

        assert_eq!(
            policy.evaluate(&caller),
            Err(AuthorizationDenial::MissingClaim {
                key: "role".to_string()
            })
        );
    }

    #[test]
    fn test_required_claims_mismatch() {
        let policy = AuthorizationPolicy::allow_all()
            .with_required_claim("env", "prod")
            .with_required_claim("role", "service");

        let caller = identity(ALLOWED).with_claims([("env", "dev")]);

        assert_eq!(
            policy.evaluate(&caller),
            Err(AuthorizationDenial::ClaimMismatch {
                key: "env".to_string()
            })
        );
    }

    #[test]
    fn test_claims_checked_after_membership() {
        let policy = AuthorizationPolicy::allow_list([ALLOWED]).with_required_claim("env", "prod");

        assert!(matches!(
            policy.evaluate(&identity(DENIED)),
            Err(AuthorizationDenial::NotAuthorized { .. })
        ));
        assert!(matches!(
            policy.evaluate(&identity(ALLOWED)),
            Err(AuthorizationDenial::MissingClaim { .. })
        ));
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let policy = AuthorizationPolicy::allow_list(["spiffe://example.org/*"])
            .with_required_claim("env", "prod");
        let caller = identity(ALLOWED).with_claims([("env", "prod")]);
        let outsider = identity("spiffe://other.org/api");

        assert_eq!(policy.evaluate(&caller), policy.evaluate(&caller));
        assert_eq!(policy.evaluate(&outsider), policy.evaluate(&outsider));
    }

    #[test]
    fn test_policy_deserializes() {
        let policy: AuthorizationPolicy = serde_json::from_str(
            r#"{"patterns":["*payments"],"mode":"deny_list","required_claims":{"env":"prod"}}"#,
        )
        .unwrap();

        assert_eq!(policy.mode(), PolicyMode::DenyList);
        assert_eq!(policy.patterns().to_vec(), vec!["*payments".to_string()]);
        assert_eq!(policy.required_claims().get("env").map(String::as_str), Some("prod"));
    }
}
