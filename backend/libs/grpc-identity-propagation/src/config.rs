//! Interceptor configuration
//!
//! Every struct has sensible defaults and can be loaded from the
//! environment. Unset variables fall back to defaults; set-but-invalid
//! values are reported instead of silently ignored.
use crate::call_chain::DEFAULT_MAX_CALL_CHAIN_DEPTH;
use crate::error::ConfigError;
use crate::policy::{AuthorizationPolicy, PolicyMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

/// Outbound propagation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub propagate_original_caller: bool,
    pub propagate_call_chain: bool,
    pub max_call_chain_depth: usize,
    /// Inbound header names copied verbatim to outbound calls
    pub custom_headers: Vec<String>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            propagate_original_caller: true,
            propagate_call_chain: true,
            max_call_chain_depth: DEFAULT_MAX_CALL_CHAIN_DEPTH,
            custom_headers: Vec::new(),
        }
    }
}

impl PropagationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            propagate_original_caller: parse_var(
                "EPHEMOS_PROPAGATE_ORIGINAL_CALLER",
                defaults.propagate_original_caller,
            )?,
            propagate_call_chain: parse_var(
                "EPHEMOS_PROPAGATE_CALL_CHAIN",
                defaults.propagate_call_chain,
            )?,
            max_call_chain_depth: parse_var(
                "EPHEMOS_MAX_CALL_CHAIN_DEPTH",
                defaults.max_call_chain_depth,
            )?,
            custom_headers: list_var("EPHEMOS_CUSTOM_HEADERS")
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_chain_depth == 0 {
            return Err(ConfigError::ZeroMaxDepth);
        }
        Ok(())
    }
}

/// Inbound authentication settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub require_authentication: bool,
    /// Identity patterns, interpreted according to `mode`
    pub patterns: Vec<String>,
    pub mode: PolicyMode,
    pub required_claims: BTreeMap<String, String>,
    /// Full method paths (`/pkg.Service/Method`) that bypass authentication
    pub skip_methods: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_authentication: true,
            patterns: Vec::new(),
            mode: PolicyMode::AllowList,
            required_claims: BTreeMap::new(),
            skip_methods: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let deny_mode = parse_var("EPHEMOS_DENY_MODE", false)?;

        Ok(Self {
            require_authentication: parse_var("EPHEMOS_REQUIRE_AUTH", true)?,
            patterns: list_var("EPHEMOS_AUTHORIZED_SERVICES"),
            mode: if deny_mode {
                PolicyMode::DenyList
            } else {
                PolicyMode::AllowList
            },
            required_claims: claims_var("EPHEMOS_REQUIRED_CLAIMS")?,
            skip_methods: list_var("EPHEMOS_SKIP_METHODS"),
        })
    }

    pub fn policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy::new(self.patterns.iter().cloned(), self.mode)
            .with_required_claims(self.required_claims.clone())
    }
}

/// Which server-side interceptors run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    pub enable_auth: bool,
    pub enable_identity_propagation: bool,
    pub auth: AuthConfig,
    pub propagation: PropagationConfig,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            enable_auth: true,
            enable_identity_propagation: false,
            auth: AuthConfig::default(),
            propagation: PropagationConfig::default(),
        }
    }
}

impl InterceptorConfig {
    /// Authentication and propagation both on
    pub fn production() -> Self {
        Self {
            enable_identity_propagation: true,
            ..Self::default()
        }
    }

    /// Authentication off, propagation on
    pub fn development() -> Self {
        Self {
            enable_auth: false,
            enable_identity_propagation: true,
            auth: AuthConfig {
                require_authentication: false,
                ..AuthConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            enable_auth: parse_var("EPHEMOS_ENABLE_AUTH", defaults.enable_auth)?,
            enable_identity_propagation: parse_var(
                "EPHEMOS_ENABLE_IDENTITY_PROPAGATION",
                defaults.enable_identity_propagation,
            )?,
            auth: AuthConfig::from_env()?,
            propagation: PropagationConfig::from_env()?,
        })
    }
}

fn parse_var<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    var: var.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

fn list_var(var: &str) -> Vec<String> {
    env::var(var)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `k=v,k=v`
fn claims_var(var: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    list_var(var)
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: pair.clone(),
                reason: "expected key=value".to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 12] = [
        "EPHEMOS_PROPAGATE_ORIGINAL_CALLER",
        "EPHEMOS_PROPAGATE_CALL_CHAIN",
        "EPHEMOS_MAX_CALL_CHAIN_DEPTH",
        "EPHEMOS_CUSTOM_HEADERS",
        "EPHEMOS_REQUIRE_AUTH",
        "EPHEMOS_AUTHORIZED_SERVICES",
        "EPHEMOS_DENY_MODE",
        "EPHEMOS_REQUIRED_CLAIMS",
        "EPHEMOS_SKIP_METHODS",
        "EPHEMOS_ENABLE_AUTH",
        "EPHEMOS_ENABLE_IDENTITY_PROPAGATION",
        "EPHEMOS_SVID_CERT_PATH",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = PropagationConfig::default();
        assert!(config.propagate_original_caller);
        assert!(config.propagate_call_chain);
        assert_eq!(config.max_call_chain_depth, 10);
        assert!(config.custom_headers.is_empty());

        let auth = AuthConfig::default();
        assert!(auth.require_authentication);
        assert_eq!(auth.mode, PolicyMode::AllowList);
    }

    #[test]
    fn test_presets() {
        let dev = InterceptorConfig::development();
        assert!(!dev.enable_auth);
        assert!(!dev.auth.require_authentication);
        assert!(dev.enable_identity_propagation);

        let prod = InterceptorConfig::production();
        assert!(prod.enable_auth);
        assert!(prod.auth.require_authentication);
        assert!(prod.enable_identity_propagation);

        let default = InterceptorConfig::default();
        assert!(default.enable_auth);
        assert!(!default.enable_identity_propagation);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = PropagationConfig {
            max_call_chain_depth: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMaxDepth)));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: InterceptorConfig = serde_json::from_str(
            r#"{"enable_auth":false,"propagation":{"max_call_chain_depth":3}}"#,
        )
        .unwrap();

        assert!(!config.enable_auth);
        assert_eq!(config.propagation.max_call_chain_depth, 3);
        assert!(config.propagation.propagate_call_chain);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();

        assert_eq!(PropagationConfig::from_env().unwrap(), PropagationConfig::default());
        assert_eq!(AuthConfig::from_env().unwrap(), AuthConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        clear_env();
        env::set_var("EPHEMOS_PROPAGATE_CALL_CHAIN", "false");
        env::set_var("EPHEMOS_MAX_CALL_CHAIN_DEPTH", "4");
        env::set_var("EPHEMOS_CUSTOM_HEADERS", "X-Tenant-ID, x-trace ,");
        env::set_var("EPHEMOS_AUTHORIZED_SERVICES", "spiffe://example.org/*,*admin");
        env::set_var("EPHEMOS_DENY_MODE", "true");
        env::set_var("EPHEMOS_REQUIRED_CLAIMS", "env=prod, role=service");
        env::set_var("EPHEMOS_SKIP_METHODS", "/grpc.health.v1.Health/Check");

        let propagation = PropagationConfig::from_env().unwrap();
        assert!(!propagation.propagate_call_chain);
        assert!(propagation.propagate_original_caller);
        assert_eq!(propagation.max_call_chain_depth, 4);
        assert_eq!(propagation.custom_headers, vec!["x-tenant-id", "x-trace"]);

        let auth = AuthConfig::from_env().unwrap();
        assert_eq!(auth.mode, PolicyMode::DenyList);
        assert_eq!(auth.patterns, vec!["spiffe://example.org/*", "*admin"]);
        assert_eq!(auth.required_claims.get("role").map(String::as_str), Some("service"));
        assert_eq!(auth.skip_methods, vec!["/grpc.health.v1.Health/Check"]);

        let policy = auth.policy();
        assert_eq!(policy.mode(), PolicyMode::DenyList);
        assert_eq!(policy.required_claims().len(), 2);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_values() {
        clear_env();

        env::set_var("EPHEMOS_MAX_CALL_CHAIN_DEPTH", "ten");
        assert!(matches!(
            PropagationConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        env::set_var("EPHEMOS_MAX_CALL_CHAIN_DEPTH", "0");
        assert!(matches!(
            PropagationConfig::from_env(),
            Err(ConfigError::ZeroMaxDepth)
        ));

        env::set_var("EPHEMOS_REQUIRED_CLAIMS", "env");
        assert!(AuthConfig::from_env().is_err());

        clear_env();
    }
}
