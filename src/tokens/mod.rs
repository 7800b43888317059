//! # Token Exchange
//!
//! Token plumbing for authenticating the agent: a one-shot [`TokenExchanger`]
//! used right before CSR signing, and the richer STS-style [`TokenManager`] used
//! for proxy-to-control-plane authentication.

pub mod exchanger;
pub mod sts;

pub use exchanger::StsTokenExchanger;
pub use sts::StsTokenManager;

use crate::secrets::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Grant type of an RFC 8693 token exchange.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
/// Token type identifier for JWTs.
pub const JWT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";
/// Token type identifier for OAuth access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
/// XDS auth provider that needs the `x-goog-user-project` header.
pub const GCP_XDS_AUTH_PROVIDER: &str = "gcp";

/// Result type for token operations.
pub type Result<T> = std::result::Result<T, TokenError>;

/// Errors from credential fetching and token exchange.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The request is missing required fields or carries invalid values.
    #[error("Invalid token request: {message}")]
    InvalidRequest { message: String },

    /// The token endpoint could not be reached.
    #[error("Token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint answered with a non-success status.
    #[error("Token endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The token endpoint's answer could not be used.
    #[error("Invalid token response: {message}")]
    InvalidResponse { message: String },

    /// No token is available from this source.
    #[error("Token unavailable: {message}")]
    Unavailable { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TokenError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    /// Transport failures, throttling and server errors may clear up; malformed
    /// requests and responses will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Unavailable { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// RFC 8693 token exchange request.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StsRequestParameters {
    pub grant_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_token_type: Option<String>,
    pub subject_token: String,
    pub subject_token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_token_type: Option<String>,
}

impl StsRequestParameters {
    /// A token exchange request for `subject_token` of `subject_token_type`.
    pub fn token_exchange(subject_token: impl Into<String>, subject_token_type: &str) -> Self {
        Self {
            grant_type: TOKEN_EXCHANGE_GRANT_TYPE.to_string(),
            subject_token: subject_token.into(),
            subject_token_type: subject_token_type.to_string(),
            ..Default::default()
        }
    }

    /// Check the fields the exchange protocol requires.
    pub fn validate(&self) -> Result<()> {
        if self.grant_type != TOKEN_EXCHANGE_GRANT_TYPE {
            return Err(TokenError::invalid_request(format!(
                "unsupported grant type '{}'",
                self.grant_type
            )));
        }
        if self.subject_token.is_empty() {
            return Err(TokenError::invalid_request("subject_token is required"));
        }
        if self.subject_token_type.is_empty() {
            return Err(TokenError::invalid_request("subject_token_type is required"));
        }
        if self.actor_token.is_some() && self.actor_token_type.is_none() {
            return Err(TokenError::invalid_request(
                "actor_token_type is required with actor_token",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StsRequestParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StsRequestParameters")
            .field("grant_type", &self.grant_type)
            .field("resource", &self.resource)
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .field("requested_token_type", &self.requested_token_type)
            .field("subject_token", &"[REDACTED]")
            .field("subject_token_type", &self.subject_token_type)
            .field("actor_token", &self.actor_token.as_ref().map(|_| "[REDACTED]"))
            .field("actor_token_type", &self.actor_token_type)
            .finish()
    }
}

/// RFC 8693 token exchange response.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StsResponseParameters {
    pub access_token: String,
    pub issued_token_type: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
}

impl std::fmt::Debug for StsResponseParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StsResponseParameters")
            .field("access_token", &"[REDACTED]")
            .field("issued_token_type", &self.issued_token_type)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// STS-style token service.
#[async_trait]
pub trait TokenManager: Send + Sync + std::fmt::Debug {
    /// Exchange a token; returns [`StsResponseParameters`] as JSON.
    async fn generate_token(&self, parameters: &StsRequestParameters) -> Result<Vec<u8>>;

    /// Status of every issued token as JSON.
    async fn dump_token_status(&self) -> Result<Vec<u8>>;

    /// Metadata headers to attach to a call authenticated with `token`.
    fn get_metadata(
        &self,
        for_ca: bool,
        xds_auth_provider: &str,
        token: &str,
    ) -> Result<HashMap<String, String>>;
}

/// Swaps a locally held token for one the CA accepts.
#[async_trait]
pub trait TokenExchanger: Send + Sync + std::fmt::Debug {
    async fn exchange_token(&self, subject_token: &SecretString) -> Result<SecretString>;
}
