//! Token exchanger built on any [`TokenManager`].

use super::{
    Result, StsRequestParameters, StsResponseParameters, TokenError, TokenExchanger, TokenManager,
    JWT_TOKEN_TYPE,
};
use crate::secrets::SecretString;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// Exchanges a JWT for the access token carried in the STS response.
#[derive(Debug, Clone)]
pub struct StsTokenExchanger {
    manager: Arc<dyn TokenManager>,
    audience: Option<String>,
    scope: Option<String>,
    requested_token_type: Option<String>,
}

impl StsTokenExchanger {
    pub fn new(manager: Arc<dyn TokenManager>) -> Self {
        Self { manager, audience: None, scope: None, requested_token_type: None }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_requested_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.requested_token_type = Some(token_type.into());
        self
    }
}

#[async_trait]
impl TokenExchanger for StsTokenExchanger {
    #[instrument(skip(self, subject_token))]
    async fn exchange_token(&self, subject_token: &SecretString) -> Result<SecretString> {
        if subject_token.is_empty() {
            return Err(TokenError::invalid_request("subject token is empty"));
        }

        let parameters = StsRequestParameters {
            audience: self.audience.clone(),
            scope: self.scope.clone(),
            requested_token_type: self.requested_token_type.clone(),
            ..StsRequestParameters::token_exchange(subject_token.expose_secret(), JWT_TOKEN_TYPE)
        };

        let body = self.manager.generate_token(&parameters).await?;
        let response: StsResponseParameters = serde_json::from_slice(&body)?;
        if response.access_token.is_empty() {
            return Err(TokenError::invalid_response("exchanged token is empty"));
        }

        Ok(SecretString::new(response.access_token))
    }
}
