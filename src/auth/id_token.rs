//! Authentication from a signed ID token (JWT).

use super::extract::{extract_bearer_token, extract_request_token};
use super::{AuthError, AuthSource, Authenticator, CallContext, Caller, Result};
use crate::config::SecurityOptions;
use crate::secrets::identity::spiffe_id_from_k8s_subject;
use async_trait::async_trait;
use http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

pub const ID_TOKEN_AUTHENTICATOR_TYPE: &str = "IDTokenAuthenticator";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains_any(&self, accepted: &[String]) -> bool {
        match self {
            Audience::One(aud) => accepted.contains(aud),
            Audience::Many(auds) => auds.iter().any(|aud| accepted.contains(aud)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
}

/// Verifies bearer JWTs and maps Kubernetes service account subjects to SPIFFE
/// identities in the local trust domain.
pub struct IdTokenAuthenticator {
    key: DecodingKey,
    validation: Validation,
    trust_domain: String,
    audiences: Vec<String>,
    require_third_party_token: bool,
}

impl std::fmt::Debug for IdTokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenAuthenticator")
            .field("algorithms", &self.validation.algorithms)
            .field("trust_domain", &self.trust_domain)
            .field("audiences", &self.audiences)
            .field("require_third_party_token", &self.require_third_party_token)
            .finish()
    }
}

impl IdTokenAuthenticator {
    pub fn new(key: DecodingKey, algorithm: Algorithm, options: &SecurityOptions) -> Self {
        let mut validation = Validation::new(algorithm);
        // Audiences are checked against `token_audiences` after decoding.
        validation.validate_aud = false;

        Self {
            key,
            validation,
            trust_domain: options.trust_domain.clone(),
            audiences: options.token_audiences.clone(),
            require_third_party_token: options.require_third_party_token,
        }
    }

    /// Only accept tokens whose `iss` claim is `issuer`.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    fn verify(&self, token: &str) -> Result<Caller> {
        let data = decode::<IdTokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::invalid_token(e.to_string()))?;
        let claims = data.claims;

        match &claims.aud {
            Some(aud) if !aud.contains_any(&self.audiences) => {
                return Err(AuthError::invalid_token(format!(
                    "audience does not match any of {:?}",
                    self.audiences
                )));
            }
            None if self.require_third_party_token => {
                return Err(AuthError::invalid_token("token has no audience"));
            }
            _ => {}
        }

        let subject = claims.sub.ok_or_else(|| AuthError::invalid_token("token has no subject"))?;
        let identity = spiffe_id_from_k8s_subject(&self.trust_domain, &subject)
            .map_err(|e| AuthError::invalid_token(e.to_string()))?
            .ok_or_else(|| {
                AuthError::invalid_token(format!(
                    "subject '{}' is not a Kubernetes service account",
                    subject
                ))
            })?;

        debug!(identity = %identity, "Authenticated caller from ID token");
        Ok(Caller { auth_source: AuthSource::IdToken, identities: vec![identity] })
    }
}

#[async_trait]
impl Authenticator for IdTokenAuthenticator {
    async fn authenticate(&self, context: &CallContext) -> Result<Caller> {
        let token = extract_bearer_token(context)?;
        self.verify(&token)
    }

    fn authenticator_type(&self) -> &str {
        ID_TOKEN_AUTHENTICATOR_TYPE
    }

    async fn authenticate_request(&self, request: &Parts) -> Result<Caller> {
        let token = extract_request_token(request)?;
        self.verify(&token)
    }
}
