//! HTTP token manager speaking RFC 8693 to a security token service.

use super::{
    Result, StsRequestParameters, StsResponseParameters, TokenError, TokenManager,
    GCP_XDS_AUTH_PROVIDER,
};
use crate::auth::AUTHORIZATION_METADATA;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Header naming the GCP project billed for XDS calls.
pub const GOOGLE_USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Upper bound on error bodies kept in [`TokenError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Status of one issued token, as reported by `dump_token_status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenInfo {
    pub token_type: String,
    pub issue_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
}

#[derive(Serialize)]
struct TokenStatusDump<'a> {
    tokens: &'a [TokenInfo],
}

#[derive(Debug)]
pub struct StsTokenManager {
    client: reqwest::Client,
    endpoint: Url,
    gcp_project_id: Option<String>,
    issued: DashMap<String, TokenInfo>,
}

impl StsTokenManager {
    /// Create a manager posting exchanges to `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TokenError::invalid_request(format!("invalid STS endpoint: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self { client, endpoint, gcp_project_id: None, issued: DashMap::new() })
    }

    /// Project id added as `x-goog-user-project` on GCP XDS calls.
    pub fn with_gcp_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.gcp_project_id = Some(project_id.into());
        self
    }

    fn record_issued(&self, response: &StsResponseParameters) -> Result<()> {
        let issue_time = Utc::now();
        let expire_time = chrono::Duration::try_seconds(response.expires_in.max(0))
            .and_then(|lifetime| issue_time.checked_add_signed(lifetime))
            .ok_or_else(|| {
                TokenError::invalid_response(format!(
                    "expires_in out of range: {}",
                    response.expires_in
                ))
            })?;
        let token_type = if response.issued_token_type.is_empty() {
            response.token_type.clone()
        } else {
            response.issued_token_type.clone()
        };

        self.issued.insert(token_type.clone(), TokenInfo { token_type, issue_time, expire_time });
        Ok(())
    }
}

#[async_trait]
impl TokenManager for StsTokenManager {
    #[instrument(skip(self, parameters), fields(endpoint = %self.endpoint))]
    async fn generate_token(&self, parameters: &StsRequestParameters) -> Result<Vec<u8>> {
        parameters.validate()?;

        let response = self.client.post(self.endpoint.clone()).form(parameters).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&body).chars().take(MAX_ERROR_BODY).collect();
            warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(TokenError::Status { status: status.as_u16(), body });
        }

        let parsed: StsResponseParameters = serde_json::from_slice(&body)
            .map_err(|e| TokenError::invalid_response(format!("malformed STS response: {}", e)))?;
        if parsed.access_token.is_empty() {
            return Err(TokenError::invalid_response("STS response has no access_token"));
        }

        self.record_issued(&parsed)?;
        debug!(
            issued_token_type = %parsed.issued_token_type,
            expires_in = parsed.expires_in,
            "Token exchanged"
        );

        Ok(serde_json::to_vec(&parsed)?)
    }

    async fn dump_token_status(&self) -> Result<Vec<u8>> {
        let mut tokens: Vec<TokenInfo> =
            self.issued.iter().map(|entry| entry.value().clone()).collect();
        tokens.sort_by(|a, b| a.token_type.cmp(&b.token_type));

        Ok(serde_json::to_vec(&TokenStatusDump { tokens: &tokens })?)
    }

    fn get_metadata(
        &self,
        for_ca: bool,
        xds_auth_provider: &str,
        token: &str,
    ) -> Result<HashMap<String, String>> {
        let mut metadata = HashMap::new();
        if token.is_empty() {
            return Ok(metadata);
        }

        if !for_ca && xds_auth_provider == GCP_XDS_AUTH_PROVIDER {
            if let Some(project_id) = &self.gcp_project_id {
                metadata.insert(GOOGLE_USER_PROJECT_HEADER.to_string(), project_id.clone());
            }
        }
        metadata.insert(AUTHORIZATION_METADATA.to_string(), format!("Bearer {}", token));

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(StsTokenManager::new("not a url").is_err());
    }

    #[test]
    fn test_get_metadata() {
        let manager =
            StsTokenManager::new("https://sts.example.com/v1/token").unwrap().with_gcp_project_id("proj-1");

        assert!(manager.get_metadata(false, "gcp", "").unwrap().is_empty());

        let for_ca = manager.get_metadata(true, "gcp", "tok").unwrap();
        assert_eq!(for_ca.get("authorization"), Some(&"Bearer tok".to_string()));
        assert!(!for_ca.contains_key(GOOGLE_USER_PROJECT_HEADER));

        let for_xds = manager.get_metadata(false, "gcp", "tok").unwrap();
        assert_eq!(for_xds.get(GOOGLE_USER_PROJECT_HEADER), Some(&"proj-1".to_string()));

        let other_provider = manager.get_metadata(false, "", "tok").unwrap();
        assert_eq!(other_provider.len(), 1);
    }

    #[tokio::test]
    async fn test_dump_status_empty() {
        let manager = StsTokenManager::new("https://sts.example.com/v1/token").unwrap();
        let dump = manager.dump_token_status().await.unwrap();
        assert_eq!(String::from_utf8(dump).unwrap(), r#"{"tokens":[]}"#);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_sending() {
        let manager = StsTokenManager::new("http://127.0.0.1:9/token").unwrap();
        let request = StsRequestParameters::default();
        let err = manager.generate_token(&request).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidRequest { .. }));
    }
}
