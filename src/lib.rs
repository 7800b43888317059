//! # Meshguard
//!
//! Workload identity for service-mesh sidecars: issues, caches and rotates
//! short-lived X.509 certificates, and authenticates inbound callers from the
//! credentials they present.
//!
//! ## Architecture
//!
//! ```text
//! secret discovery ──► SecretManagerClient ──► CaClient (CSR signing)
//!                           │    ▲
//!                           │    └── CredFetcher / TokenExchanger (CA credential)
//!                           └──► rotation task ──► watchers (SecretUpdate)
//!
//! inbound call ──► AuthenticatorDispatcher ──► ClientCertAuthenticator
//!                                          └─► IdTokenAuthenticator
//! ```
//!
//! ## Core Components
//!
//! - **Secret Manager** ([`secrets`]): single-flight issuance per resource name,
//!   proactive rotation, stale-but-valid serving when the CA is unavailable
//! - **CA Client** ([`ca`]): the CSR signing boundary plus an in-process CA
//! - **Credentials** ([`credentials`], [`tokens`]): platform credentials, STS
//!   token exchange and the token manager used for control plane calls
//! - **Authentication** ([`auth`]): bearer token extraction and the
//!   authenticator chain
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use meshguard::ca::LocalCaClient;
//! use meshguard::secrets::{SecretManager, SecretManagerClient};
//! use meshguard::SecurityOptions;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> meshguard::Result<()> {
//!     let options = Arc::new(SecurityOptions::from_env()?);
//!     let ca = Arc::new(LocalCaClient::new(&options.trust_domain)?);
//!     let manager = SecretManagerClient::builder(ca, options).build();
//!
//!     let secret = manager.generate_secret("default").await?;
//!     println!("certificate expires at {}", secret.expire_time);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod ca;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod tokens;

// Re-export commonly used types and traits
pub use auth::{Authenticator, AuthenticatorDispatcher, Caller};
pub use config::{ObservabilityConfig, SecurityOptions};
pub use errors::{Error, MeshguardError, Result};
pub use observability::init_logging;
pub use secrets::{SecretItem, SecretManager, SecretManagerClient};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
