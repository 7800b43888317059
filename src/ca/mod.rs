//! # CA Client
//!
//! Boundary to the certificate authority. Implementations receive an already
//! built PEM CSR plus a requested validity and return the signed chain as an
//! ordered list of PEM certificates: leaf first, then intermediates, root last.
//!
//! No retry policy lives at this boundary; the secret manager decides when to
//! try again.

pub mod local;

pub use local::LocalCaClient;

use crate::secrets::{Result, SecretString};
use async_trait::async_trait;

/// Provider name of the Google managed mesh CA.
pub const GOOGLE_CA_PROVIDER: &str = "GoogleCA";
/// Provider name of Google Certificate Authority Service.
pub const GOOGLE_CAS_PROVIDER: &str = "GoogleCAS";
/// Provider name of the control plane's built-in CA.
pub const CITADEL_PROVIDER: &str = "Citadel";
/// Provider name of [`LocalCaClient`].
pub const LOCAL_CA_PROVIDER: &str = "LocalCA";

/// Certificate authority client.
#[async_trait]
pub trait CaClient: Send + Sync + std::fmt::Debug {
    /// Sign `csr_pem` for `validity_secs` seconds.
    ///
    /// `credential` is the token the agent presents to authenticate itself, when
    /// one was acquired.
    async fn csr_sign(
        &self,
        csr_pem: &[u8],
        validity_secs: i64,
        credential: Option<&SecretString>,
    ) -> Result<Vec<String>>;

    /// Root certificates the CA vouches for. An empty list means the CA does
    /// not publish a separate bundle and roots come from signed chains.
    async fn get_root_cert_bundle(&self) -> Result<Vec<String>>;

    /// Release connections held by the client.
    fn close(&self);

    fn provider_name(&self) -> &str;
}
