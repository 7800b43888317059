//! Error types for secret issuance, caching and rotation.

use std::sync::Arc;
use thiserror::Error;

/// Result type for secret manager operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while issuing or serving workload secrets.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// No usable credential could be obtained for the CA call.
    #[error("Credential unavailable: {message}")]
    Credential { message: String },

    /// The CA rejected the CSR or could not be reached.
    #[error("CSR signing failed: {message}")]
    Signing { message: String },

    /// The workload identity could not be determined.
    #[error("Identity resolution failed: {message}")]
    Identity { message: String },

    /// Private key or CSR generation failed.
    #[error("Key generation failed: {message}")]
    KeyGeneration { message: String },

    /// A certificate returned by the CA could not be used.
    #[error("Invalid certificate: {message}")]
    CertificateParse { message: String },

    /// Issuance failed and no still-valid cached secret exists.
    #[error("Failed to generate secret '{resource_name}': {source}")]
    GenerationFailed {
        resource_name: String,
        #[source]
        source: Arc<SecretsError>,
    },

    /// The caller's deadline elapsed before the secret was available.
    #[error("Timed out waiting for secret '{resource_name}'")]
    Timeout { resource_name: String },

    /// The secret manager has been closed.
    #[error("Secret manager is shut down")]
    Shutdown,

    /// I/O error while reading a mounted token.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SecretsError {
    /// Create a credential error.
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential { message: message.into() }
    }

    /// Create a signing error.
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing { message: message.into() }
    }

    /// Create an identity error.
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity { message: message.into() }
    }

    /// Create a key generation error.
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration { message: message.into() }
    }

    /// Create a certificate parse error.
    pub fn certificate_parse(message: impl Into<String>) -> Self {
        Self::CertificateParse { message: message.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether a later attempt may succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Credential { .. }
            | Self::Signing { .. }
            | Self::Timeout { .. }
            | Self::IoError(_) => true,
            Self::GenerationFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<rcgen::Error> for SecretsError {
    fn from(error: rcgen::Error) -> Self {
        Self::key_generation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = SecretsError::signing("connection refused");
        assert!(matches!(err, SecretsError::Signing { .. }));
        assert_eq!(err.to_string(), "CSR signing failed: connection refused");

        let err = SecretsError::identity("no service account");
        assert!(matches!(err, SecretsError::Identity { .. }));
    }

    #[test]
    fn test_generation_failed_keeps_source() {
        let cause = Arc::new(SecretsError::signing("CA unavailable"));
        let err =
            SecretsError::GenerationFailed { resource_name: "default".to_string(), source: cause };

        assert!(err.to_string().contains("default"));
        assert!(err.to_string().contains("CA unavailable"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SecretsError::credential("metadata server down").is_retryable());
        assert!(SecretsError::Timeout { resource_name: "default".to_string() }.is_retryable());
        assert!(!SecretsError::identity("bad subject").is_retryable());
        assert!(!SecretsError::Shutdown.is_retryable());
        assert!(!SecretsError::certificate_parse("expired").is_retryable());
    }
}
