//! Shared helpers for integration tests: an instrumented CA wrapper, canned
//! certificate chains and option builders.

#![allow(dead_code)]

use async_trait::async_trait;
use meshguard::ca::{CaClient, LocalCaClient};
use meshguard::config::{IdentityFallback, SecurityOptions};
use meshguard::secrets::{self, SecretString, SecretsError};
use rcgen::{CertificateParams, KeyPair};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TRUST_DOMAIN: &str = "cluster.local";

/// Wraps a [`LocalCaClient`], counting signing calls and injecting delay and
/// failures on demand.
#[derive(Debug)]
pub struct CountingCa {
    inner: LocalCaClient,
    calls: AtomicUsize,
    delay_ms: AtomicU64,
    fail: AtomicBool,
    credentials: Mutex<Vec<Option<String>>>,
}

impl CountingCa {
    pub fn new() -> Arc<Self> {
        Self::wrap(LocalCaClient::new(TRUST_DOMAIN).expect("local CA"))
    }

    pub fn wrap(inner: LocalCaClient) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
            fail: AtomicBool::new(false),
            credentials: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Credentials presented on every signing call so far, in order.
    pub fn presented_credentials(&self) -> Vec<Option<String>> {
        self.credentials.lock().unwrap().clone()
    }

    pub fn root_cert_pem(&self) -> &str {
        self.inner.root_cert_pem()
    }
}

#[async_trait]
impl CaClient for CountingCa {
    async fn csr_sign(
        &self,
        csr_pem: &[u8],
        validity_secs: i64,
        credential: Option<&SecretString>,
    ) -> secrets::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(|c| c.expose_secret().to_string()));

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SecretsError::signing("injected CA failure"));
        }

        self.inner.csr_sign(csr_pem, validity_secs, credential).await
    }

    async fn get_root_cert_bundle(&self) -> secrets::Result<Vec<String>> {
        self.inner.get_root_cert_bundle().await
    }

    fn close(&self) {
        self.inner.close();
    }

    fn provider_name(&self) -> &str {
        "CountingCA"
    }
}

/// A CA that always answers with the same chain.
#[derive(Debug)]
pub struct StaticCa {
    pub chain: Vec<String>,
}

#[async_trait]
impl CaClient for StaticCa {
    async fn csr_sign(
        &self,
        _csr_pem: &[u8],
        _validity_secs: i64,
        _credential: Option<&SecretString>,
    ) -> secrets::Result<Vec<String>> {
        Ok(self.chain.clone())
    }

    async fn get_root_cert_bundle(&self) -> secrets::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn close(&self) {}

    fn provider_name(&self) -> &str {
        "StaticCA"
    }
}

/// Self-signed certificate whose NotAfter lies `offset` from now.
pub fn certificate_expiring_in(offset: time::Duration) -> String {
    let key = KeyPair::generate().expect("key pair");
    let mut params = CertificateParams::new(vec!["expired.test".to_string()]).expect("params");
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::days(2);
    params.not_after = now + offset;
    params.self_signed(&key).expect("self-signed").pem()
}

/// Options whose identity comes from the resource name.
pub fn options(ttl_seconds: u64, grace_ratio: f64) -> Arc<SecurityOptions> {
    Arc::new(SecurityOptions {
        trust_domain: TRUST_DOMAIN.to_string(),
        secret_ttl_seconds: ttl_seconds,
        secret_rotation_grace_period_ratio: grace_ratio,
        identity_fallback: IdentityFallback::ResourceName,
        ..Default::default()
    })
}

/// Unsigned JWT carrying `sub`, enough for identity resolution.
pub fn jwt_with_subject(subject: &str) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}"}}"#, subject));
    format!("{}.{}.sig", header, payload)
}
