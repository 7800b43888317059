//! # Caller Authentication
//!
//! Maps the credentials an inbound caller presents (a client certificate or a
//! bearer token) to a [`Caller`]. Each credential kind has its own
//! [`Authenticator`]; the [`AuthenticatorDispatcher`] tries them in order.
//!
//! gRPC calls arrive as a [`CallContext`] (built from a `tonic::Request`); plain
//! HTTP calls arrive as [`http::request::Parts`], with peer certificates carried
//! in the [`PeerCertificates`] request extension.

pub mod client_cert;
pub mod dispatcher;
pub mod extract;
pub mod id_token;

pub use client_cert::ClientCertAuthenticator;
pub use dispatcher::AuthenticatorDispatcher;
pub use extract::{extract_bearer_token, extract_request_token};
pub use id_token::IdTokenAuthenticator;

use async_trait::async_trait;
use http::request::Parts;
use std::fmt;
use thiserror::Error;
use tonic::metadata::MetadataMap;

/// Metadata key (and HTTP header) carrying the caller's token.
pub const AUTHORIZATION_METADATA: &str = "authorization";
/// Prefix of a bearer token value.
pub const BEARER_TOKEN_PREFIX: &str = "Bearer ";
/// Prefix of a Kubernetes token value in an HTTP header.
pub const K8S_TOKEN_PREFIX: &str = "Istio ";

/// Result type for authentication.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors from token extraction and caller authentication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no metadata is attached")]
    MissingMetadata,

    #[error("no HTTP authorization header exists")]
    MissingAuthorizationHeader,

    #[error("no bearer token exists in HTTP authorization header")]
    MissingBearer,

    #[error("no client certificate is presented")]
    NoClientCertificate,

    #[error("invalid client certificate: {message}")]
    InvalidCertificate { message: String },

    #[error("invalid ID token: {message}")]
    InvalidToken { message: String },

    /// Every configured authenticator rejected the caller.
    #[error("authentication failed: [{}]", failures.join("; "))]
    Unauthenticated { failures: Vec<String> },
}

impl AuthError {
    pub fn invalid_certificate(message: impl Into<String>) -> Self {
        Self::InvalidCertificate { message: message.into() }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken { message: message.into() }
    }

    /// True for errors caused by a missing or badly formatted credential, as
    /// opposed to a credential that was present but rejected.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MissingMetadata | Self::MissingAuthorizationHeader | Self::MissingBearer
        )
    }
}

/// How a caller proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthSource {
    ClientCertificate,
    IdToken,
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthSource::ClientCertificate => write!(f, "client_certificate"),
            AuthSource::IdToken => write!(f, "id_token"),
        }
    }
}

/// An authenticated caller. Lives only as long as the request it came with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub auth_source: AuthSource,
    pub identities: Vec<String>,
}

/// DER-encoded certificates presented by the peer, leaf first.
///
/// Insert into `http::Extensions` so HTTP authenticators can see the TLS peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCertificates(pub Vec<Vec<u8>>);

impl PeerCertificates {
    pub fn leaf(&self) -> Option<&[u8]> {
        self.0.first().map(Vec::as_slice)
    }
}

/// Transport-level view of an inbound gRPC call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: Option<MetadataMap>,
    peer_certificates: Option<PeerCertificates>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_peer_certificates(mut self, certificates: PeerCertificates) -> Self {
        self.peer_certificates = Some(certificates);
        self
    }

    /// Capture metadata and TLS peer certificates from a tonic request.
    pub fn from_tonic_request<T>(request: &tonic::Request<T>) -> Self {
        let peer_certificates = request.peer_certs().map(|certs| {
            PeerCertificates(certs.iter().map(|cert| cert.as_ref().to_vec()).collect())
        });

        Self { metadata: Some(request.metadata().clone()), peer_certificates }
    }

    pub fn metadata(&self) -> Option<&MetadataMap> {
        self.metadata.as_ref()
    }

    pub fn peer_certificates(&self) -> Option<&PeerCertificates> {
        self.peer_certificates.as_ref()
    }
}

/// One way of authenticating a caller.
#[async_trait]
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Authenticate a gRPC call.
    async fn authenticate(&self, context: &CallContext) -> Result<Caller>;

    /// Name used in logs and aggregated failures.
    fn authenticator_type(&self) -> &str;

    /// Authenticate a plain HTTP request.
    async fn authenticate_request(&self, request: &Parts) -> Result<Caller>;
}
