//! # Metrics Collection
//!
//! Counters and histograms for certificate issuance, rotation, caching,
//! caller authentication and token exchange.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics recorder that tracks meshguard metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a CSR signing round trip against a CA
    pub fn record_csr_sign(&self, provider: &str, success: bool, duration: f64) {
        let status = if success { "success" } else { "error" };
        let labels = [("provider", provider.to_string()), ("outcome", status.to_string())];
        counter!("meshguard_csr_sign_total", &labels).increment(1);

        let duration_labels = [("provider", provider.to_string())];
        histogram!("meshguard_csr_sign_duration_seconds", &duration_labels).record(duration);
    }

    /// Record whether a secret request was served from cache
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!("meshguard_secret_cache_total", "result" => result).increment(1);
    }

    /// Record a stale-but-valid secret served after an issuance failure
    pub fn record_stale_served(&self) {
        counter!("meshguard_secret_cache_total", "result" => "stale").increment(1);
    }

    /// Record a rotation attempt outcome
    pub fn record_rotation(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("meshguard_rotation_total", "outcome" => status).increment(1);
    }

    /// Record authentication attempt outcome per authenticator
    pub fn record_authentication(&self, authenticator: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels =
            [("authenticator", authenticator.to_string()), ("outcome", status.to_string())];
        counter!("meshguard_authentication_total", &labels).increment(1);
    }

    /// Record a token exchange outcome
    pub fn record_token_exchange(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("meshguard_token_exchange_total", "outcome" => status).increment(1);
    }
}

/// Describe all meshguard metrics so exporters show them before the first event.
pub fn register_metrics() {
    describe_counter!(
        "meshguard_csr_sign_total",
        Unit::Count,
        "CSR signing requests grouped by CA provider and outcome"
    );
    describe_histogram!(
        "meshguard_csr_sign_duration_seconds",
        Unit::Seconds,
        "CSR signing round trip duration"
    );
    describe_counter!(
        "meshguard_secret_cache_total",
        Unit::Count,
        "Secret requests grouped by cache result (hit, miss, stale)"
    );
    describe_counter!(
        "meshguard_rotation_total",
        Unit::Count,
        "Scheduled rotation attempts grouped by outcome"
    );
    describe_counter!(
        "meshguard_authentication_total",
        Unit::Count,
        "Caller authentication attempts grouped by authenticator and outcome"
    );
    describe_counter!(
        "meshguard_token_exchange_total",
        Unit::Count,
        "Token exchanges grouped by outcome"
    );

    for result in ["hit", "miss", "stale"] {
        counter!("meshguard_secret_cache_total", "result" => result).absolute(0);
    }
}
