//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.
//!
//! Secret material never reaches a log line: private keys are wrapped in
//! [`crate::secrets::SecretString`], whose `Debug` and `Display` impls redact.

use crate::config::ObservabilityConfig;
use crate::errors::{MeshguardError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create a tracing span for secret manager operations
#[macro_export]
macro_rules! secret_span {
    ($operation:expr, $resource_name:expr) => {
        tracing::info_span!(
            "secret_operation",
            operation = %$operation,
            resource_name = %$resource_name,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $resource_name:expr, $($field:tt)*) => {
        tracing::info_span!(
            "secret_operation",
            operation = %$operation,
            resource_name = %$resource_name,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for caller authentication
#[macro_export]
macro_rules! auth_span {
    ($authenticator:expr) => {
        tracing::debug_span!(
            "authentication",
            authenticator = %$authenticator,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($authenticator:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "authentication",
            authenticator = %$authenticator,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            MeshguardError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| {
        MeshguardError::internal(format!("Failed to install tracing subscriber: {}", e))
    })?;

    tracing::debug!(
        log_level = %config.log_level,
        json_logging = config.json_logging,
        "Logging initialized"
    );

    Ok(())
}

/// Log the security options at startup. Token paths are logged, token contents are not.
pub fn log_security_options(options: &crate::config::SecurityOptions) {
    tracing::info!(
        ca_endpoint = %options.ca_endpoint,
        ca_provider = %options.ca_provider_name,
        trust_domain = %options.trust_domain,
        key_algorithm = %options.key_algorithm,
        secret_ttl_seconds = options.secret_ttl_seconds,
        grace_period_ratio = options.secret_rotation_grace_period_ratio,
        cred_fetcher = ?options.cred_fetcher_type,
        jwt_path = ?options.jwt_path,
        "meshguard security options"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = secret_span!("generate", "default");
        let _span = secret_span!("rotate", "default", attempt = 2);
        let _span = auth_span!("ClientCertAuthenticator");
        let _span = auth_span!("IDTokenAuthenticator", audience = "istio-ca");
    }

    #[test]
    fn test_log_security_options() {
        let options = crate::config::SecurityOptions::default();

        // This should not panic
        log_security_options(&options);
    }

    #[test]
    fn test_init_logging_invalid_level() {
        // Only reachable when RUST_LOG is unset in the test environment
        if std::env::var("RUST_LOG").is_err() {
            let config = ObservabilityConfig {
                log_level: "meshguard=[bad".to_string(),
                ..Default::default()
            };
            assert!(init_logging(&config).is_err());
        }
    }

    #[test]
    fn test_init_logging_twice_fails() {
        let config = ObservabilityConfig::default();
        let first = init_logging(&config);
        let second = init_logging(&config);
        // Whichever call installed the subscriber, the other must fail
        assert!(first.is_err() || second.is_err());
    }
}
