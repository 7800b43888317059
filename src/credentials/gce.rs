//! Google Compute Engine instance identity credentials.

use super::{CredFetcher, GCE};
use crate::secrets::SecretString;
use crate::tokens::{Result, TokenError};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Metadata server reachable from every GCE instance.
pub const GCE_METADATA_BASE_URL: &str = "http://metadata.google.internal";

const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";

/// Refresh the cached token once it is this close to `exp`.
const TOKEN_REFRESH_WINDOW_SECS: i64 = 300;

#[derive(Debug)]
pub struct GceCredFetcher {
    client: reqwest::Client,
    base_url: String,
    trust_domain: String,
    identity_provider: String,
    cached: RwLock<Option<SecretString>>,
}

#[derive(Deserialize)]
struct ExpClaim {
    exp: Option<i64>,
}

fn token_exp(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<ExpClaim>(&bytes).ok()?.exp
}

/// True when `token` expires within the refresh window or its `exp` is unreadable.
fn needs_refresh(token: &SecretString) -> bool {
    match token_exp(token.expose_secret()) {
        Some(exp) => exp - Utc::now().timestamp() < TOKEN_REFRESH_WINDOW_SECS,
        None => true,
    }
}

impl GceCredFetcher {
    pub fn new(trust_domain: &str, identity_provider: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: GCE_METADATA_BASE_URL.to_string(),
            trust_domain: trust_domain.to_string(),
            identity_provider: identity_provider.to_string(),
            cached: RwLock::new(None),
        }
    }

    /// Point the fetcher at a different metadata server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn cached_token(&self) -> Option<SecretString> {
        let guard = self.cached.read().ok()?;
        guard.as_ref().filter(|token| !needs_refresh(token)).cloned()
    }

    async fn fetch_identity_token(&self) -> Result<SecretString> {
        let url = format!("{}{}", self.base_url, IDENTITY_PATH);
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .query(&[("audience", self.trust_domain.as_str()), ("format", "full")])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Metadata server refused identity token");
            return Err(TokenError::Status { status: status.as_u16(), body });
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(TokenError::invalid_response("metadata server returned an empty token"));
        }

        Ok(SecretString::new(token))
    }
}

#[async_trait]
impl CredFetcher for GceCredFetcher {
    #[instrument(skip(self), fields(audience = %self.trust_domain))]
    async fn get_platform_credential(&self) -> Result<SecretString> {
        if let Some(token) = self.cached_token() {
            debug!("Using cached GCE identity token");
            return Ok(token);
        }

        let token = self.fetch_identity_token().await?;
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some(token.clone());
        }
        debug!("Fetched GCE identity token");

        Ok(token)
    }

    fn get_type(&self) -> &str {
        GCE
    }

    fn get_identity_provider(&self) -> &str {
        &self.identity_provider
    }

    fn stop(&self) {
        if let Ok(mut guard) = self.cached.write() {
            *guard = None;
        }
    }
}
