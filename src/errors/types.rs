//! # Error Types
//!
//! Crate-level error type for meshguard using `thiserror`. Domain errors from the
//! secret manager, the authenticators and the token layer convert into it so that
//! process wiring code can use a single `Result`.

use crate::auth::AuthError;
use crate::secrets::SecretsError;
use crate::tokens::TokenError;

/// Custom result type for meshguard operations
pub type Result<T> = std::result::Result<T, MeshguardError>;

/// Main error type for meshguard
#[derive(thiserror::Error, Debug)]
pub enum MeshguardError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Secret issuance, caching and rotation errors
    #[error(transparent)]
    Secrets(#[from] SecretsError),

    /// Inbound caller authentication errors
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Token exchange errors
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MeshguardError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Whether the failing operation may succeed if attempted again later.
    ///
    /// Malformed requests and configuration problems never do; CA and credential
    /// failures usually do once the authority or the platform recovers.
    pub fn is_retryable(&self) -> bool {
        match self {
            MeshguardError::Io { .. } => true,
            MeshguardError::Secrets(err) => err.is_retryable(),
            MeshguardError::Token(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for MeshguardError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<config::ConfigError> for MeshguardError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for MeshguardError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>();
        fields.sort();

        Self::validation(format!("Validation failed: {}", fields.join("; ")))
    }
}
