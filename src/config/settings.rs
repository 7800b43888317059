//! # Security Options
//!
//! Immutable-after-load configuration shared by the secret manager and the
//! authenticators. Loaded once at startup and handed around as `Arc<SecurityOptions>`.

use crate::errors::{MeshguardError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix used by [`SecurityOptions::from_env`].
pub const ENV_PREFIX: &str = "MESHGUARD";

/// Key algorithm used when generating workload private keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KeyAlgorithm {
    /// ECDSA over P-256 with SHA-256
    #[default]
    #[serde(rename = "ECDSA_P256", alias = "ECDSA")]
    EcdsaP256,
    /// ECDSA over P-384 with SHA-384
    #[serde(rename = "ECDSA_P384")]
    EcdsaP384,
    /// Ed25519
    #[serde(rename = "ED25519")]
    Ed25519,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdsaP256 => "ECDSA_P256",
            Self::EcdsaP384 => "ECDSA_P384",
            Self::Ed25519 => "ED25519",
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the identity resolver does when neither the token nor the configured
/// namespace/service account yield a workload identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFallback {
    /// Use the requested resource name verbatim as the identity
    #[default]
    ResourceName,
    /// Fail the issuance
    Reject,
}

/// Configuration for workload secret issuance and caller authentication.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SecurityOptions {
    /// CA endpoint to which the agent sends CSRs
    #[validate(length(min = 1, message = "CA endpoint cannot be empty"))]
    pub ca_endpoint: String,

    /// Overrides the server name (SNI) derived from `ca_endpoint`
    pub ca_endpoint_san: Option<String>,

    /// CA provider name (e.g. "Citadel", "GoogleCA")
    #[validate(length(min = 1, message = "CA provider name cannot be empty"))]
    pub ca_provider_name: String,

    /// SPIFFE trust domain of the workload identities
    #[validate(length(min = 1, message = "Trust domain cannot be empty"))]
    pub trust_domain: String,

    /// Key algorithm for workload private keys
    pub key_algorithm: KeyAlgorithm,

    /// Path of the bootstrap JWT presented to the CA
    pub jwt_path: Option<PathBuf>,

    /// Requested workload certificate lifetime in seconds
    #[validate(range(
        min = 1,
        max = 315_360_000,
        message = "Secret TTL must be between 1 second and 10 years"
    ))]
    pub secret_ttl_seconds: u64,

    /// Fraction of the certificate lifetime before expiry at which rotation starts.
    /// At 0.10 and a one hour TTL, rotation begins six minutes before expiry.
    #[validate(range(
        min = 0.0,
        exclusive_max = 1.0,
        message = "Rotation grace period ratio must be in [0, 1)"
    ))]
    pub secret_rotation_grace_period_ratio: f64,

    /// Cluster the agent runs in
    pub cluster_id: String,

    /// Namespace of the workload
    pub workload_namespace: Option<String>,

    /// Service account of the workload
    pub service_account: Option<String>,

    /// Credential fetcher variant ("GoogleComputeEngine", "Mock"); none disables it
    pub cred_fetcher_type: Option<String>,

    /// Identity provider able to authenticate the platform credential
    pub cred_identity_provider: String,

    /// Auth provider used for XDS calls (e.g. "gcp")
    pub xds_auth_provider: Option<String>,

    /// Delay before reading file-mounted certificates after a change, in milliseconds
    pub file_debounce_millis: u64,

    /// Reject first-party tokens (tokens without an audience)
    pub require_third_party_token: bool,

    /// Audiences accepted on ID tokens presented by callers
    #[validate(length(min = 1, message = "At least one token audience is required"))]
    pub token_audiences: Vec<String>,

    /// Identity resolution fallback
    pub identity_fallback: IdentityFallback,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            ca_endpoint: "istiod.istio-system.svc:15012".to_string(),
            ca_endpoint_san: None,
            ca_provider_name: "Citadel".to_string(),
            trust_domain: "cluster.local".to_string(),
            key_algorithm: KeyAlgorithm::default(),
            jwt_path: None,
            secret_ttl_seconds: 24 * 60 * 60,
            secret_rotation_grace_period_ratio: 0.5,
            cluster_id: "Kubernetes".to_string(),
            workload_namespace: None,
            service_account: None,
            cred_fetcher_type: None,
            cred_identity_provider: "GoogleComputeEngine".to_string(),
            xds_auth_provider: None,
            file_debounce_millis: 100,
            require_third_party_token: false,
            token_audiences: vec!["istio-ca".to_string()],
            identity_fallback: IdentityFallback::default(),
        }
    }
}

impl SecurityOptions {
    /// Load options from `MESHGUARD_*` environment variables on top of the defaults.
    ///
    /// `MESHGUARD_TOKEN_AUDIENCES` is a comma separated list.
    pub fn from_env() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("token_audiences"),
            )
            .build()?;

        Self::from_config(source)
    }

    /// Build options from any prebuilt configuration source and validate them.
    pub fn from_config(source: config::Config) -> Result<Self> {
        let options: SecurityOptions = source.try_deserialize()?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(MeshguardError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.trust_domain.contains('/') {
            return Err(MeshguardError::validation_field(
                "Trust domain cannot contain '/'",
                "trust_domain",
            ));
        }

        if self.token_audiences.iter().any(|aud| aud.trim().is_empty()) {
            return Err(MeshguardError::validation_field(
                "Token audiences cannot be blank",
                "token_audiences",
            ));
        }

        Ok(())
    }

    /// Requested certificate lifetime as Duration
    pub fn secret_ttl(&self) -> Duration {
        Duration::from_secs(self.secret_ttl_seconds)
    }

    /// File debounce delay as Duration
    pub fn file_debounce(&self) -> Duration {
        Duration::from_millis(self.file_debounce_millis)
    }

    /// Namespace and service account when both are configured and non-empty
    pub fn workload_identity(&self) -> Option<(&str, &str)> {
        match (self.workload_namespace.as_deref(), self.service_account.as_deref()) {
            (Some(ns), Some(sa)) if !ns.is_empty() && !sa.is_empty() => Some((ns, sa)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validation() {
        let options = SecurityOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.secret_ttl(), Duration::from_secs(86400));
        assert_eq!(options.file_debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_grace_ratio_range() {
        let options =
            SecurityOptions { secret_rotation_grace_period_ratio: 1.0, ..Default::default() };
        assert!(options.validate().is_err());

        let options =
            SecurityOptions { secret_rotation_grace_period_ratio: -0.1, ..Default::default() };
        assert!(options.validate().is_err());

        let options =
            SecurityOptions { secret_rotation_grace_period_ratio: 0.0, ..Default::default() };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let options = SecurityOptions { secret_ttl_seconds: 0, ..Default::default() };
        assert!(options.validate().is_err());

        let options = SecurityOptions { secret_ttl_seconds: u64::MAX, ..Default::default() };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("10 years"));

        let options = SecurityOptions { trust_domain: String::new(), ..Default::default() };
        assert!(options.validate().is_err());

        let options =
            SecurityOptions { trust_domain: "evil.org/ns".to_string(), ..Default::default() };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("Trust domain"));

        let options = SecurityOptions { token_audiences: vec![], ..Default::default() };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_workload_identity() {
        let options = SecurityOptions::default();
        assert_eq!(options.workload_identity(), None);

        let options = SecurityOptions {
            workload_namespace: Some("payments".to_string()),
            service_account: Some("ledger".to_string()),
            ..Default::default()
        };
        assert_eq!(options.workload_identity(), Some(("payments", "ledger")));

        let options = SecurityOptions {
            workload_namespace: Some(String::new()),
            service_account: Some("ledger".to_string()),
            ..Default::default()
        };
        assert_eq!(options.workload_identity(), None);
    }

    #[test]
    fn test_from_config_overrides() {
        let source = config::Config::builder()
            .set_override("trust_domain", "example.org")
            .unwrap()
            .set_override("secret_ttl_seconds", 3600)
            .unwrap()
            .set_override("secret_rotation_grace_period_ratio", 0.1)
            .unwrap()
            .set_override("key_algorithm", "ECDSA_P384")
            .unwrap()
            .set_override("identity_fallback", "reject")
            .unwrap()
            .build()
            .unwrap();

        let options = SecurityOptions::from_config(source).unwrap();
        assert_eq!(options.trust_domain, "example.org");
        assert_eq!(options.secret_ttl(), Duration::from_secs(3600));
        assert!((options.secret_rotation_grace_period_ratio - 0.1).abs() < f64::EPSILON);
        assert_eq!(options.key_algorithm, KeyAlgorithm::EcdsaP384);
        assert_eq!(options.identity_fallback, IdentityFallback::Reject);
        // Untouched fields keep their defaults
        assert_eq!(options.ca_provider_name, "Citadel");
        assert_eq!(options.token_audiences, vec!["istio-ca".to_string()]);
    }

    #[test]
    fn test_from_config_rejects_invalid_values() {
        let source = config::Config::builder()
            .set_override("secret_rotation_grace_period_ratio", 1.5)
            .unwrap()
            .build()
            .unwrap();

        assert!(SecurityOptions::from_config(source).is_err());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("MESHGUARD_TRUST_DOMAIN", "mesh.example.com");
        std::env::set_var("MESHGUARD_TOKEN_AUDIENCES", "istio-ca,mesh-ca");
        std::env::set_var("MESHGUARD_REQUIRE_THIRD_PARTY_TOKEN", "true");

        let options = SecurityOptions::from_env().unwrap();
        assert_eq!(options.trust_domain, "mesh.example.com");
        assert_eq!(options.token_audiences, vec!["istio-ca".to_string(), "mesh-ca".to_string()]);
        assert!(options.require_third_party_token);

        std::env::remove_var("MESHGUARD_TRUST_DOMAIN");
        std::env::remove_var("MESHGUARD_TOKEN_AUDIENCES");
        std::env::remove_var("MESHGUARD_REQUIRE_THIRD_PARTY_TOKEN");
    }

    #[test]
    fn test_key_algorithm_serde_alias() {
        let alg: KeyAlgorithm = serde_json::from_str("\"ECDSA\"").unwrap();
        assert_eq!(alg, KeyAlgorithm::EcdsaP256);
        assert_eq!(serde_json::to_string(&KeyAlgorithm::Ed25519).unwrap(), "\"ED25519\"");
        assert_eq!(KeyAlgorithm::EcdsaP384.to_string(), "ECDSA_P384");
    }
}
