//! # Secret Lifecycle Management
//!
//! Issues, caches and rotates short-lived workload identity certificates.
//!
//! A secret discovery server asks [`SecretManager::generate_secret`] for a
//! resource name. Live cached items are returned immediately; otherwise the
//! manager resolves the workload identity, builds a fresh key and CSR, obtains a
//! credential for the CA (platform credential or bootstrap token, optionally
//! exchanged) and has the [`crate::ca::CaClient`] sign it. Results are cached
//! and rotated in the background at
//! `created + (expire - created) * (1 - grace_ratio)`.
//!
//! ```rust,ignore
//! use meshguard::ca::LocalCaClient;
//! use meshguard::secrets::{SecretManager, SecretManagerClient, WORKLOAD_KEY_CERT_RESOURCE_NAME};
//!
//! let ca = Arc::new(LocalCaClient::new("cluster.local")?);
//! let manager = SecretManagerClient::builder(ca, Arc::new(options))
//!     .bootstrap_token(token)
//!     .build();
//!
//! let secret = manager.generate_secret(WORKLOAD_KEY_CERT_RESOURCE_NAME).await?;
//! let mut updates = manager.subscribe();
//! ```

pub mod csr;
pub mod error;
pub mod identity;
pub mod manager;
pub mod rotation;
pub mod types;

pub use error::{Result, SecretsError};
pub use identity::{IdentityResolver, KubernetesIdentityResolver};
pub use manager::{SecretManager, SecretManagerBuilder, SecretManagerClient};
pub use rotation::RetryConfig;
pub use types::{SecretItem, SecretString, SecretUpdate};

/// Resource name of the root certificate bundle.
pub const ROOT_CERT_RESOURCE_NAME: &str = "ROOTCA";

/// Resource name of the workload key and certificate chain.
pub const WORKLOAD_KEY_CERT_RESOURCE_NAME: &str = "default";

/// Well-known path of a file-mounted certificate chain.
pub const DEFAULT_CERT_CHAIN_FILE_PATH: &str = "./etc/certs/cert-chain.pem";

/// Well-known path of a file-mounted private key.
pub const DEFAULT_KEY_FILE_PATH: &str = "./etc/certs/key.pem";

/// Well-known path of a file-mounted root certificate.
pub const DEFAULT_ROOT_CERT_FILE_PATH: &str = "./etc/certs/root-cert.pem";

/// Resource name asking for the operating system's trusted roots.
pub const SYSTEM_ROOT_CERTS: &str = "SYSTEM";

/// Name of the certificate signer in CSR requests.
pub const CERT_SIGNER: &str = "CertSigner";
