//! Secret lifecycle manager.
//!
//! Serves workload key/certificate pairs and root bundles by resource name,
//! caching them until their rotation deadline and re-issuing them in the
//! background before they expire.
//!
//! Issuance is single-flight per resource name: the first caller spawns the
//! issuance task and registers a `watch` receiver in the in-flight map; every
//! other caller for that name clones the receiver and waits for the same
//! outcome. The task publishes to the cache before it leaves the in-flight map,
//! so a caller never misses both.

use super::csr::{concat_pem, earliest_not_after, generate_csr, leaf_not_after};
use super::error::{Result, SecretsError};
use super::identity::{IdentityResolver, KubernetesIdentityResolver};
use super::rotation::{RetryConfig, RotationScheduler};
use super::types::{SecretItem, SecretString, SecretUpdate};
use super::{ROOT_CERT_RESOURCE_NAME, WORKLOAD_KEY_CERT_RESOURCE_NAME};
use crate::ca::CaClient;
use crate::config::SecurityOptions;
use crate::credentials::{new_cred_fetcher, CredFetcher};
use crate::observability::MetricsRecorder;
use crate::tokens::TokenExchanger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn, Instrument};

/// Capacity of the watcher channel; slow watchers see `Lagged` and should re-pull.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Shared result of one issuance attempt.
type Outcome = std::result::Result<Arc<SecretItem>, Arc<SecretsError>>;

/// Entry point used by secret discovery servers.
#[async_trait]
pub trait SecretManager: Send + Sync {
    /// Return the current secret for `resource_name`, issuing one if needed.
    ///
    /// `"ROOTCA"` yields the root bundle, `"default"` the workload key/certificate.
    async fn generate_secret(&self, resource_name: &str) -> Result<Arc<SecretItem>>;
}

/// Builder for [`SecretManagerClient`].
pub struct SecretManagerBuilder {
    ca: Arc<dyn CaClient>,
    options: Arc<SecurityOptions>,
    credential_fetcher: Option<Arc<dyn CredFetcher>>,
    token_exchanger: Option<Arc<dyn TokenExchanger>>,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    bootstrap_token: Option<SecretString>,
    retry: RetryConfig,
}

impl SecretManagerBuilder {
    /// Platform credential presented to the CA instead of the bootstrap token.
    pub fn credential_fetcher(mut self, fetcher: Arc<dyn CredFetcher>) -> Self {
        self.credential_fetcher = Some(fetcher);
        self
    }

    /// Select the credential fetcher named by `cred_fetcher_type`, if any.
    pub fn credential_fetcher_from_options(mut self) -> crate::tokens::Result<Self> {
        let cred_type = self.options.cred_fetcher_type.as_deref().unwrap_or_default();
        if let Some(fetcher) = new_cred_fetcher(
            cred_type,
            &self.options.trust_domain,
            &self.options.cred_identity_provider,
        )? {
            self.credential_fetcher = Some(fetcher);
        }
        Ok(self)
    }

    /// Exchange the chosen credential before every signing call.
    pub fn token_exchanger(mut self, exchanger: Arc<dyn TokenExchanger>) -> Self {
        self.token_exchanger = Some(exchanger);
        self
    }

    pub fn identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity_resolver = Some(resolver);
        self
    }

    /// In-memory bootstrap token. Without one, `jwt_path` is read on every issuance.
    pub fn bootstrap_token(mut self, token: impl Into<SecretString>) -> Self {
        self.bootstrap_token = Some(token.into());
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Build the manager and start its rotation task. Must be called inside a
    /// Tokio runtime.
    pub fn build(self) -> SecretManagerClient {
        let identity_resolver = self
            .identity_resolver
            .unwrap_or_else(|| Arc::new(KubernetesIdentityResolver::new(&self.options)));
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let inner = Arc::new_cyclic(|weak: &Weak<ManagerInner>| {
            let weak = weak.clone();
            let rotation = RotationScheduler::spawn(move |resource_name: String| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.rotate(resource_name).await;
                    }
                }
            });

            ManagerInner {
                ca: self.ca,
                options: self.options,
                credential_fetcher: self.credential_fetcher,
                token_exchanger: self.token_exchanger,
                identity_resolver,
                bootstrap_token: self.bootstrap_token,
                retry: self.retry,
                cache: DashMap::new(),
                inflight: DashMap::new(),
                failures: DashMap::new(),
                updates,
                rotation,
                closed: AtomicBool::new(false),
                metrics: MetricsRecorder::new(),
            }
        });

        info!(
            ca_provider = %inner.ca.provider_name(),
            trust_domain = %inner.options.trust_domain,
            "Secret manager started"
        );

        SecretManagerClient { inner }
    }
}

/// Caches, issues and rotates workload secrets.
pub struct SecretManagerClient {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for SecretManagerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretManagerClient")
            .field("ca", &self.inner.ca)
            .field("cached", &self.inner.cache.len())
            .field("inflight", &self.inner.inflight.len())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl SecretManagerClient {
    pub fn builder(ca: Arc<dyn CaClient>, options: Arc<SecurityOptions>) -> SecretManagerBuilder {
        SecretManagerBuilder {
            ca,
            options,
            credential_fetcher: None,
            token_exchanger: None,
            identity_resolver: None,
            bootstrap_token: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn options(&self) -> &SecurityOptions {
        &self.inner.options
    }

    /// Like [`SecretManager::generate_secret`] with a caller deadline.
    ///
    /// On timeout only this caller stops waiting; the issuance keeps running for
    /// other waiters and still populates the cache.
    pub async fn generate_secret_with_timeout(
        &self,
        resource_name: &str,
        timeout: Duration,
    ) -> Result<Arc<SecretItem>> {
        match tokio::time::timeout(timeout, self.generate_secret(resource_name)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(resource_name = %resource_name, timeout_ms = timeout.as_millis() as u64, "Timed out waiting for secret");
                Err(SecretsError::Timeout { resource_name: resource_name.to_string() })
            }
        }
    }

    /// Register a watcher notified whenever a cached secret is superseded.
    pub fn subscribe(&self) -> broadcast::Receiver<SecretUpdate> {
        self.inner.updates.subscribe()
    }

    /// Cached secret for `resource_name` without triggering issuance. Expired
    /// items are never returned.
    pub fn cached_secret(&self, resource_name: &str) -> Option<Arc<SecretItem>> {
        let now = Utc::now();
        self.inner
            .cache
            .get(resource_name)
            .filter(|item| !item.is_expired_at(now))
            .map(|item| item.value().clone())
    }

    /// Stop rotation, drop cached secrets and release the CA client and
    /// credential fetcher. Later calls fail with [`SecretsError::Shutdown`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.rotation.shutdown().await;
        self.inner.cache.clear();
        self.inner.failures.clear();
        self.inner.ca.close();
        if let Some(fetcher) = &self.inner.credential_fetcher {
            fetcher.stop();
        }

        info!("Secret manager closed");
    }
}

impl Drop for SecretManagerClient {
    fn drop(&mut self) {
        self.inner.rotation.stop();
    }
}

#[async_trait]
impl SecretManager for SecretManagerClient {
    #[instrument(skip(self))]
    async fn generate_secret(&self, resource_name: &str) -> Result<Arc<SecretItem>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SecretsError::Shutdown);
        }

        if let Some(item) = self.inner.live_item(resource_name, Utc::now()) {
            self.inner.metrics.record_cache_lookup(true);
            debug!("Serving cached secret");
            return Ok(item);
        }
        self.inner.metrics.record_cache_lookup(false);

        if let Some(item) = self.inner.backoff_item(resource_name, Utc::now()) {
            self.inner.metrics.record_stale_served();
            debug!("Serving cached secret while rotation backs off");
            return Ok(item);
        }

        let rx = self.inner.issue(resource_name);
        wait_for_outcome(rx).await.map_err(|source| SecretsError::GenerationFailed {
            resource_name: resource_name.to_string(),
            source,
        })
    }
}

struct ManagerInner {
    ca: Arc<dyn CaClient>,
    options: Arc<SecurityOptions>,
    credential_fetcher: Option<Arc<dyn CredFetcher>>,
    token_exchanger: Option<Arc<dyn TokenExchanger>>,
    identity_resolver: Arc<dyn IdentityResolver>,
    bootstrap_token: Option<SecretString>,
    retry: RetryConfig,
    cache: DashMap<String, Arc<SecretItem>>,
    inflight: DashMap<String, watch::Receiver<Option<Outcome>>>,
    failures: DashMap<String, u32>,
    updates: broadcast::Sender<SecretUpdate>,
    rotation: RotationScheduler,
    closed: AtomicBool,
    metrics: MetricsRecorder,
}

/// Removes the in-flight entry when the issuance task ends, including by panic.
struct InflightGuard {
    inner: Arc<ManagerInner>,
    resource_name: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inner.inflight.remove(&self.resource_name);
    }
}

async fn wait_for_outcome(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
    let outcome = rx.wait_for(Option::is_some).await.map(|value| value.clone());
    match outcome {
        Ok(Some(outcome)) => outcome,
        _ => Err(Arc::new(SecretsError::internal("issuance task ended without a result"))),
    }
}

impl ManagerInner {
    fn grace_ratio(&self) -> f64 {
        self.options.secret_rotation_grace_period_ratio
    }

    fn live_item(&self, resource_name: &str, now: DateTime<Utc>) -> Option<Arc<SecretItem>> {
        let ratio = self.grace_ratio();
        self.cache
            .get(resource_name)
            .filter(|item| item.is_live_at(now, ratio))
            .map(|item| item.value().clone())
    }

    /// The cached item for a name whose last issuance failed, while it is still
    /// valid. The next attempt belongs to the scheduled retry.
    fn backoff_item(&self, resource_name: &str, now: DateTime<Utc>) -> Option<Arc<SecretItem>> {
        if !self.failures.contains_key(resource_name) {
            return None;
        }
        self.cache
            .get(resource_name)
            .filter(|item| !item.is_expired_at(now))
            .map(|item| item.value().clone())
    }

    /// Join the in-flight issuance for `resource_name` or start one.
    fn issue(self: &Arc<Self>, resource_name: &str) -> watch::Receiver<Option<Outcome>> {
        match self.inflight.entry(resource_name.to_string()) {
            Entry::Occupied(entry) => {
                debug!(resource_name = %resource_name, "Joining in-flight issuance");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A flight may have completed between the caller's cache check and now
                if let Some(item) = self.live_item(resource_name, Utc::now()) {
                    let (_tx, rx) = watch::channel(Some(Ok(item)));
                    return rx;
                }

                let (tx, rx) = watch::channel(None);
                entry.insert(rx.clone());

                let guard =
                    InflightGuard { inner: Arc::clone(self), resource_name: resource_name.to_string() };
                let issuance = Arc::clone(self).run_issuance(resource_name.to_string());
                tokio::spawn(async move {
                    let outcome = issuance.await;
                    tx.send_replace(Some(outcome));
                    drop(guard);
                });

                rx
            }
        }
    }

    fn run_issuance(self: Arc<Self>, resource_name: String) -> BoxFuture<'static, Outcome> {
        let span = crate::secret_span!("issue", resource_name);
        async move {
            let result = if resource_name == ROOT_CERT_RESOURCE_NAME {
                self.issue_root().await
            } else {
                self.issue_workload(&resource_name).await
            };

            if self.closed.load(Ordering::Acquire) {
                return Err(Arc::new(SecretsError::Shutdown));
            }

            let result = result.and_then(|item| {
                self.store(item).ok_or_else(|| {
                    SecretsError::signing(
                        "CA returned a certificate expiring no later than the cached one",
                    )
                })
            });

            match result {
                Ok(item) => {
                    self.failures.remove(&resource_name);
                    self.schedule_rotation(&item);
                    if resource_name != ROOT_CERT_RESOURCE_NAME {
                        self.refresh_root_if_changed(&item);
                    }
                    info!(
                        resource_name = %resource_name,
                        expire_time = %item.expire_time,
                        "Issued secret"
                    );
                    Ok(item)
                }
                Err(err) => self.handle_failure(&resource_name, err),
            }
        }
        .instrument(span)
        .boxed()
    }

    /// Serve the previous item while it is still valid and retry with backoff;
    /// otherwise surface the failure.
    fn handle_failure(&self, resource_name: &str, err: SecretsError) -> Outcome {
        let now = Utc::now();
        let previous = self.cache.get(resource_name).map(|item| item.value().clone());

        match previous {
            Some(item) if !item.is_expired_at(now) => {
                let failures = {
                    let mut count = self.failures.entry(resource_name.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };
                let delay =
                    self.retry.backoff_for_attempt(failures).min(item.remaining_lifetime(now));
                warn!(
                    resource_name = %resource_name,
                    error = %err,
                    failures,
                    retry_in_ms = delay.as_millis() as u64,
                    expire_time = %item.expire_time,
                    "Secret issuance failed; serving cached secret until it expires"
                );
                self.rotation.schedule(resource_name, delay);
                self.metrics.record_stale_served();
                Ok(item)
            }
            previous => {
                if previous.is_some()
                    && self.cache.remove_if(resource_name, |_, item| item.is_expired_at(now)).is_some()
                {
                    self.rotation.cancel(resource_name);
                }
                self.failures.remove(resource_name);
                warn!(resource_name = %resource_name, error = %err, "Secret issuance failed");
                Err(Arc::new(err))
            }
        }
    }

    /// Cache `item` unless it would move expiry backwards. Returns `None` when the
    /// cached item was kept.
    fn store(&self, item: SecretItem) -> Option<Arc<SecretItem>> {
        let resource_name = item.resource_name.clone();
        let item = Arc::new(item);

        let superseded = match self.cache.entry(resource_name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&item));
                false
            }
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                let root_changed = resource_name == ROOT_CERT_RESOURCE_NAME
                    && item.root_cert != current.root_cert;

                if item.expire_time > current.expire_time || root_changed {
                    entry.insert(Arc::clone(&item));
                    true
                } else if same_material(current, &item) {
                    // Same root bundle re-fetched: only the rotation deadline moves
                    entry.insert(Arc::clone(&item));
                    false
                } else {
                    return None;
                }
            }
        };

        if superseded {
            debug!(resource_name = %resource_name, "Notifying secret watchers");
            let _ = self.updates.send(SecretUpdate {
                resource_name: resource_name.clone(),
                expire_time: item.expire_time,
            });
        }

        Some(item)
    }

    fn schedule_rotation(&self, item: &SecretItem) {
        let delay = item.time_to_rotation(Utc::now(), self.grace_ratio());
        self.rotation.schedule(&item.resource_name, delay);
    }

    /// Re-issue the cached root bundle when a workload chain is anchored in a
    /// root the bundle does not contain.
    fn refresh_root_if_changed(self: &Arc<Self>, item: &SecretItem) {
        let Some(root) = item.root_cert.as_ref() else {
            return;
        };
        let Some(cached_root) =
            self.cache.get(ROOT_CERT_RESOURCE_NAME).map(|entry| entry.value().clone())
        else {
            return;
        };

        let root = String::from_utf8_lossy(root);
        let bundle = cached_root.root_cert.as_deref().map(String::from_utf8_lossy);
        if bundle.map_or(false, |bundle| bundle.contains(root.trim())) {
            return;
        }

        info!("Workload root differs from cached root bundle; refreshing ROOTCA");
        drop(self.issue(ROOT_CERT_RESOURCE_NAME));
    }

    /// Scheduled rotation entry point.
    async fn rotate(self: Arc<Self>, resource_name: String) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(item) = self.live_item(&resource_name, Utc::now()) {
            debug!(resource_name = %resource_name, "Secret still live; rescheduling rotation");
            self.schedule_rotation(&item);
            return;
        }

        let outcome = wait_for_outcome(self.issue(&resource_name)).await;
        let rotated = matches!(&outcome, Ok(item) if item.is_live_at(Utc::now(), self.grace_ratio()));
        self.metrics.record_rotation(rotated);

        match outcome {
            Ok(item) if rotated => {
                info!(resource_name = %resource_name, expire_time = %item.expire_time, "Rotated secret")
            }
            Ok(item) => warn!(
                resource_name = %resource_name,
                expire_time = %item.expire_time,
                "Rotation failed; previous secret still valid"
            ),
            Err(err) => warn!(resource_name = %resource_name, error = %err, "Rotation failed"),
        }
    }

    async fn issue_workload(&self, resource_name: &str) -> Result<SecretItem> {
        let (subject_token, presented) = self.acquire_credential().await?;
        let identities = self.identity_resolver.resolve(resource_name, subject_token.as_ref())?;
        let csr = generate_csr(self.options.key_algorithm, &self.options.trust_domain, &identities)?;

        let validity_secs = i64::try_from(self.options.secret_ttl_seconds).map_err(|_| {
            SecretsError::signing(format!(
                "secret TTL of {} seconds is out of range",
                self.options.secret_ttl_seconds
            ))
        })?;

        let started = Instant::now();
        let signed =
            self.ca.csr_sign(csr.csr_pem.as_bytes(), validity_secs, presented.as_ref()).await;
        self.metrics.record_csr_sign(
            self.ca.provider_name(),
            signed.is_ok(),
            started.elapsed().as_secs_f64(),
        );

        let chain = signed.map_err(|e| match e {
            SecretsError::Signing { .. } => e,
            other => SecretsError::signing(other.to_string()),
        })?;
        let leaf = chain
            .first()
            .ok_or_else(|| SecretsError::signing("CA returned an empty certificate chain"))?;

        let created_time = Utc::now();
        let expire_time = leaf_not_after(leaf)?;
        if expire_time <= created_time {
            return Err(SecretsError::signing(format!(
                "CA returned a certificate that expired at {}",
                expire_time
            )));
        }

        let root_cert = if chain.len() > 1 {
            chain.last().map(|root| concat_pem(std::slice::from_ref(root)))
        } else {
            None
        };

        debug!(
            resource_name = %resource_name,
            identities = ?identities,
            chain_len = chain.len(),
            "Workload certificate signed"
        );

        Ok(SecretItem {
            resource_name: resource_name.to_string(),
            certificate_chain: concat_pem(&chain),
            private_key: csr.private_key,
            root_cert,
            created_time,
            expire_time,
        })
    }

    async fn issue_root(self: &Arc<Self>) -> Result<SecretItem> {
        let bundle = self.ca.get_root_cert_bundle().await.map_err(|e| match e {
            SecretsError::Signing { .. } => e,
            other => SecretsError::signing(other.to_string()),
        })?;

        let roots = if bundle.is_empty() {
            debug!("CA publishes no root bundle; deriving root from workload chain");
            let workload = wait_for_outcome(self.issue(WORKLOAD_KEY_CERT_RESOURCE_NAME))
                .await
                .map_err(|source| SecretsError::GenerationFailed {
                    resource_name: WORKLOAD_KEY_CERT_RESOURCE_NAME.to_string(),
                    source,
                })?;
            let root = workload
                .root_cert
                .as_ref()
                .ok_or_else(|| SecretsError::signing("no root certificate available"))?;
            vec![String::from_utf8_lossy(root).into_owned()]
        } else {
            bundle
        };

        let created_time = Utc::now();
        let expire_time = earliest_not_after(&roots)?;
        if expire_time <= created_time {
            return Err(SecretsError::signing(format!(
                "root certificate expired at {}",
                expire_time
            )));
        }

        Ok(SecretItem {
            resource_name: ROOT_CERT_RESOURCE_NAME.to_string(),
            certificate_chain: Vec::new(),
            private_key: SecretString::default(),
            root_cert: Some(concat_pem(&roots)),
            created_time,
            expire_time,
        })
    }

    /// Returns the subject token (used for identity resolution) and the token
    /// presented to the CA (the subject token, exchanged when an exchanger is set).
    async fn acquire_credential(&self) -> Result<(Option<SecretString>, Option<SecretString>)> {
        let subject = if let Some(fetcher) = &self.credential_fetcher {
            let token = fetcher.get_platform_credential().await.map_err(|e| {
                SecretsError::credential(format!(
                    "{} credential fetch failed: {}",
                    fetcher.get_type(),
                    e
                ))
            })?;
            Some(token)
        } else if let Some(token) = &self.bootstrap_token {
            Some(token.clone())
        } else if let Some(path) = &self.options.jwt_path {
            let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                SecretsError::credential(format!("failed to read token {}: {}", path.display(), e))
            })?;
            let token = SecretString::new(raw.trim());
            if token.is_empty() {
                return Err(SecretsError::credential(format!(
                    "token file {} is empty",
                    path.display()
                )));
            }
            Some(token)
        } else {
            None
        };

        let presented = match (&self.token_exchanger, &subject) {
            (Some(exchanger), Some(token)) => {
                let exchanged = exchanger.exchange_token(token).await;
                self.metrics.record_token_exchange(exchanged.is_ok());
                Some(exchanged.map_err(|e| {
                    SecretsError::credential(format!("token exchange failed: {}", e))
                })?)
            }
            (Some(_), None) => {
                return Err(SecretsError::credential(
                    "token exchange configured but no subject token is available",
                ))
            }
            (None, token) => token.clone(),
        };

        Ok((subject, presented))
    }
}

fn same_material(current: &SecretItem, candidate: &SecretItem) -> bool {
    current.expire_time == candidate.expire_time
        && current.certificate_chain == candidate.certificate_chain
        && current.root_cert == candidate.root_cert
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::LocalCaClient;

    fn options(ttl: u64, ratio: f64) -> Arc<SecurityOptions> {
        Arc::new(SecurityOptions {
            secret_ttl_seconds: ttl,
            secret_rotation_grace_period_ratio: ratio,
            workload_namespace: Some("default".to_string()),
            service_account: Some("web".to_string()),
            ..Default::default()
        })
    }

    fn manager(ttl: u64, ratio: f64) -> SecretManagerClient {
        let ca = Arc::new(LocalCaClient::new("cluster.local").unwrap());
        SecretManagerClient::builder(ca, options(ttl, ratio)).build()
    }

    #[tokio::test]
    async fn test_issues_and_caches_workload_secret() {
        let manager = manager(3600, 0.5);

        let first = manager.generate_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).await.unwrap();
        assert!(first.expire_time > first.created_time);
        assert!(!first.certificate_chain.is_empty());
        assert!(first.root_cert.is_some());
        assert!(first.private_key.expose_secret().contains("PRIVATE KEY"));

        let second = manager.generate_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(manager.cached_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).is_some());

        manager.close().await;
    }

    #[tokio::test]
    async fn test_root_secret_from_bundle() {
        let manager = manager(3600, 0.5);

        let root = manager.generate_secret(ROOT_CERT_RESOURCE_NAME).await.unwrap();
        assert!(root.is_root_only());
        assert!(root.private_key.is_empty());
        assert!(root.expire_time > Utc::now() + chrono::Duration::days(365));
    }

    #[tokio::test]
    async fn test_store_keeps_monotonic_expiry() {
        let manager = manager(3600, 0.5);
        let now = Utc::now();
        let item = |expire: DateTime<Utc>, chain: &[u8]| SecretItem {
            resource_name: "default".to_string(),
            certificate_chain: chain.to_vec(),
            private_key: SecretString::new("key"),
            root_cert: None,
            created_time: now,
            expire_time: expire,
        };
        let mut updates = manager.subscribe();

        let later = now + chrono::Duration::hours(2);
        assert!(manager.inner.store(item(later, b"a")).is_some());
        // Earlier expiry with different material is refused
        assert!(manager.inner.store(item(now + chrono::Duration::hours(1), b"b")).is_none());
        assert_eq!(manager.cached_secret("default").unwrap().certificate_chain, b"a".to_vec());
        assert!(updates.try_recv().is_err());

        let latest = now + chrono::Duration::hours(3);
        assert!(manager.inner.store(item(latest, b"c")).is_some());
        let update = updates.try_recv().unwrap();
        assert_eq!(update, SecretUpdate { resource_name: "default".to_string(), expire_time: latest });
    }

    #[tokio::test]
    async fn test_closed_manager_rejects_requests() {
        let manager = manager(3600, 0.5);
        manager.generate_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).await.unwrap();

        manager.close().await;
        assert!(manager.cached_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).is_none());
        let err = manager.generate_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).await.unwrap_err();
        assert!(matches!(err, SecretsError::Shutdown));

        // Closing twice is harmless
        manager.close().await;
    }

    #[tokio::test]
    async fn test_identity_failure_is_reported_as_generation_failure() {
        let ca = Arc::new(LocalCaClient::new("cluster.local").unwrap());
        let options = Arc::new(SecurityOptions {
            identity_fallback: crate::config::IdentityFallback::Reject,
            ..Default::default()
        });
        let manager = SecretManagerClient::builder(ca, options).build();

        let err = manager.generate_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).await.unwrap_err();
        match err {
            SecretsError::GenerationFailed { resource_name, source } => {
                assert_eq!(resource_name, WORKLOAD_KEY_CERT_RESOURCE_NAME);
                assert!(matches!(*source, SecretsError::Identity { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(manager.cached_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).is_none());
    }
}
