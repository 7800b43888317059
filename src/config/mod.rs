//! # Configuration Management
//!
//! Configuration consumed (not owned) by the secret manager and authenticators,
//! plus the observability settings used by [`crate::observability::init_logging`].

pub mod settings;

pub use settings::{IdentityFallback, KeyAlgorithm, SecurityOptions, ENV_PREFIX};

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level when `RUST_LOG` is not set (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit JSON structured logs instead of human-readable lines
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}
