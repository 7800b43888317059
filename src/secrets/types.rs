//! Secret material types: the redacting [`SecretString`] used for private keys
//! and tokens, and the cached [`SecretItem`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string wrapper that redacts its contents in Debug, Display, and serialization.
///
/// Private keys and bearer tokens travel as `SecretString` so they can never end up
/// in a log line or an error message. The value is only reachable through
/// [`SecretString::expose_secret`] and the backing memory is zeroed on drop.
///
/// ```rust,ignore
/// let token = SecretString::new("eyJhbGciOi...");
/// tracing::debug!(token = %token, "loaded token"); // logs [REDACTED]
/// let header = format!("Bearer {}", token.expose_secret());
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString(value))
    }
}

impl SecretString {
    /// Creates a new SecretString from a string value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying secret value. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Returns the length of the secret without exposing the value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Default for SecretString {
    fn default() -> Self {
        Self::new("")
    }
}

/// The cached unit answering one resource name.
///
/// Workload items carry a PEM private key and the PEM certificate chain (leaf
/// first). The `ROOTCA` item carries only `root_cert`. Items are immutable once
/// cached; rotation replaces the whole `Arc<SecretItem>`.
#[derive(Debug, Clone)]
pub struct SecretItem {
    pub resource_name: String,
    /// PEM certificate chain, leaf first
    pub certificate_chain: Vec<u8>,
    /// PEM private key
    pub private_key: SecretString,
    /// PEM root certificate(s), when known
    pub root_cert: Option<Vec<u8>>,
    pub created_time: DateTime<Utc>,
    /// NotAfter of the leaf certificate (earliest NotAfter for root bundles)
    pub expire_time: DateTime<Utc>,
}

impl SecretItem {
    /// Instant at which proactive rotation should start:
    /// `created + (expire - created) * (1 - grace_ratio)`.
    pub fn rotation_time(&self, grace_ratio: f64) -> DateTime<Utc> {
        let lifetime_ms = (self.expire_time - self.created_time).num_milliseconds().max(0);
        let offset_ms = (lifetime_ms as f64 * (1.0 - grace_ratio)).round() as i64;
        self.created_time + chrono::Duration::milliseconds(offset_ms)
    }

    /// Live items are served from cache without contacting the CA.
    pub fn is_live_at(&self, now: DateTime<Utc>, grace_ratio: f64) -> bool {
        now < self.rotation_time(grace_ratio)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_time
    }

    /// Time left until rotation is due, zero when already due.
    pub fn time_to_rotation(&self, now: DateTime<Utc>, grace_ratio: f64) -> std::time::Duration {
        (self.rotation_time(grace_ratio) - now).to_std().unwrap_or_default()
    }

    /// Time left until the item hard-expires, zero when already expired.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expire_time - now).to_std().unwrap_or_default()
    }

    pub fn is_root_only(&self) -> bool {
        self.certificate_chain.is_empty() && self.root_cert.is_some()
    }
}

/// Pushed to watchers when a cached item is superseded by a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretUpdate {
    pub resource_name: String,
    pub expire_time: DateTime<Utc>,
}
