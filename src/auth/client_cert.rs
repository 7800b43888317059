//! Authentication from the mTLS peer certificate.

use super::{
    AuthError, AuthSource, Authenticator, CallContext, Caller, PeerCertificates, Result,
};
use async_trait::async_trait;
use http::request::Parts;
use tracing::debug;
use x509_parser::{extensions::GeneralName, parse_x509_certificate};

pub const CLIENT_CERT_AUTHENTICATOR_TYPE: &str = "ClientCertAuthenticator";

/// Accepts callers that presented a client certificate during the TLS handshake.
///
/// The handshake already verified the chain; this only reads the identities out
/// of the leaf certificate's URI and DNS SANs.
#[derive(Debug, Clone, Default)]
pub struct ClientCertAuthenticator;

impl ClientCertAuthenticator {
    pub fn new() -> Self {
        Self
    }

    fn caller_from(&self, certificates: Option<&PeerCertificates>) -> Result<Caller> {
        let leaf =
            certificates.and_then(PeerCertificates::leaf).ok_or(AuthError::NoClientCertificate)?;
        let identities = identities_from_der(leaf)?;
        debug!(identities = ?identities, "Authenticated caller from client certificate");

        Ok(Caller { auth_source: AuthSource::ClientCertificate, identities })
    }
}

/// URI and DNS SANs of a DER certificate, in certificate order.
pub fn identities_from_der(der: &[u8]) -> Result<Vec<String>> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| AuthError::invalid_certificate(format!("failed to parse: {}", e)))?;

    let san = cert
        .subject_alternative_name()
        .map_err(|e| AuthError::invalid_certificate(format!("bad SAN extension: {}", e)))?
        .ok_or_else(|| AuthError::invalid_certificate("no subject alternative names"))?;

    let identities: Vec<String> = san
        .value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::URI(uri) => Some(uri.to_string()),
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect();

    if identities.is_empty() {
        return Err(AuthError::invalid_certificate("no URI or DNS identities in certificate"));
    }
    Ok(identities)
}

#[async_trait]
impl Authenticator for ClientCertAuthenticator {
    async fn authenticate(&self, context: &CallContext) -> Result<Caller> {
        self.caller_from(context.peer_certificates())
    }

    fn authenticator_type(&self) -> &str {
        CLIENT_CERT_AUTHENTICATOR_TYPE
    }

    async fn authenticate_request(&self, request: &Parts) -> Result<Caller> {
        self.caller_from(request.extensions.get::<PeerCertificates>())
    }
}
