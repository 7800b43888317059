//! Fixed-token credential fetcher for tests and local setups.

use super::{CredFetcher, MOCK};
use crate::secrets::SecretString;
use crate::tokens::{Result, TokenError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const MOCK_IDENTITY_PROVIDER: &str = "fakeIDP";

#[derive(Debug)]
pub struct MockCredFetcher {
    token: SecretString,
    failure: Option<String>,
    calls: AtomicUsize,
    stopped: AtomicBool,
}

impl MockCredFetcher {
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
            failure: None,
            calls: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// A fetcher whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { failure: Some(message.into()), ..Self::new("") }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredFetcher for MockCredFetcher {
    async fn get_platform_credential(&self) -> Result<SecretString> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(TokenError::unavailable(message.clone())),
            None => Ok(self.token.clone()),
        }
    }

    fn get_type(&self) -> &str {
        MOCK
    }

    fn get_identity_provider(&self) -> &str {
        MOCK_IDENTITY_PROVIDER
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher() {
        let fetcher = MockCredFetcher::new("platform-token");
        let token = fetcher.get_platform_credential().await.unwrap();
        assert_eq!(token.expose_secret(), "platform-token");
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fetcher.get_identity_provider(), "fakeIDP");

        fetcher.stop();
        assert!(fetcher.is_stopped());
    }

    #[tokio::test]
    async fn test_failing_fetcher() {
        let fetcher = MockCredFetcher::failing("metadata server unreachable");
        let err = fetcher.get_platform_credential().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("metadata server unreachable"));
    }
}
