//! # Credential Fetchers
//!
//! Platform credentials the agent presents to the CA to prove its own identity,
//! e.g. a VM instance identity token. The variant is chosen once from
//! configuration with [`new_cred_fetcher`].

pub mod gce;
pub mod mock;

pub use gce::GceCredFetcher;
pub use mock::MockCredFetcher;

use crate::secrets::SecretString;
use crate::tokens::{Result, TokenError};
use async_trait::async_trait;
use std::sync::Arc;

/// Credential fetcher type for Google Compute Engine.
pub const GCE: &str = "GoogleComputeEngine";
/// Credential fetcher type for the in-memory test fetcher.
pub const MOCK: &str = "Mock";

/// Source of a platform-native credential.
#[async_trait]
pub trait CredFetcher: Send + Sync + std::fmt::Debug {
    async fn get_platform_credential(&self) -> Result<SecretString>;

    /// Fetcher type, one of [`GCE`] or [`MOCK`].
    fn get_type(&self) -> &str;

    /// Identity provider able to authenticate the credential.
    fn get_identity_provider(&self) -> &str;

    /// Release resources held by the fetcher.
    fn stop(&self);
}

/// Select a credential fetcher variant. An empty type disables credential fetching.
pub fn new_cred_fetcher(
    cred_type: &str,
    trust_domain: &str,
    identity_provider: &str,
) -> Result<Option<Arc<dyn CredFetcher>>> {
    match cred_type {
        "" => Ok(None),
        GCE => Ok(Some(Arc::new(GceCredFetcher::new(trust_domain, identity_provider)))),
        MOCK => Ok(Some(Arc::new(MockCredFetcher::new("test_token")))),
        other => Err(TokenError::invalid_request(format!(
            "unsupported credential fetcher type '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cred_fetcher_variants() {
        assert!(new_cred_fetcher("", "cluster.local", GCE).unwrap().is_none());

        let gce = new_cred_fetcher(GCE, "cluster.local", GCE).unwrap().unwrap();
        assert_eq!(gce.get_type(), GCE);
        assert_eq!(gce.get_identity_provider(), GCE);

        let mock = new_cred_fetcher(MOCK, "cluster.local", "").unwrap().unwrap();
        assert_eq!(mock.get_type(), MOCK);

        let err = new_cred_fetcher("AzureVM", "cluster.local", "").unwrap_err();
        assert!(err.to_string().contains("AzureVM"));
    }
}
