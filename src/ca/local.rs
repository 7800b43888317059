//! In-process certificate authority.
//!
//! Holds a self-signed root (generated or loaded from PEM) and signs workload
//! CSRs directly. Meant for development setups and tests; production agents
//! talk to a remote CA.

use super::{CaClient, LOCAL_CA_PROVIDER};
use crate::secrets::{Result, SecretString, SecretsError};
use async_trait::async_trait;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use time::OffsetDateTime;
use tracing::{debug, info};

/// Root validity when the CA generates its own root.
const ROOT_VALIDITY_DAYS: i64 = 3650;

pub struct LocalCaClient {
    ca_cert: Certificate,
    ca_key: KeyPair,
    root_pem: String,
    required_credential: Option<SecretString>,
    publish_root_bundle: bool,
    signed: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for LocalCaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCaClient")
            .field("requires_credential", &self.required_credential.is_some())
            .field("publish_root_bundle", &self.publish_root_bundle)
            .field("signed", &self.signed.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn ca_error(context: &str, error: rcgen::Error) -> SecretsError {
    SecretsError::signing(format!("{}: {}", context, error))
}

impl LocalCaClient {
    /// Create a CA with a freshly generated ECDSA P-256 root.
    pub fn new(trust_domain: &str) -> Result<Self> {
        let key = KeyPair::generate().map_err(|e| ca_error("failed to generate CA key", e))?;

        let mut params = CertificateParams::default();
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, format!("{} root CA", trust_domain));
        subject.push(DnType::OrganizationName, trust_domain);
        params.distinguished_name = subject;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let now = OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::hours(1);
        params.not_after = now + time::Duration::days(ROOT_VALIDITY_DAYS);

        let ca_cert =
            params.self_signed(&key).map_err(|e| ca_error("failed to self-sign CA", e))?;
        let root_pem = ca_cert.pem().trim_end().to_string();

        info!(trust_domain = %trust_domain, "Generated local CA root");
        Ok(Self::from_parts(ca_cert, key, root_pem))
    }

    /// Load an existing CA certificate and key.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key = KeyPair::from_pem(key_pem).map_err(|e| ca_error("invalid CA key", e))?;
        let params = CertificateParams::from_ca_cert_pem(cert_pem)
            .map_err(|e| ca_error("invalid CA certificate", e))?;
        let ca_cert = params.self_signed(&key).map_err(|e| ca_error("CA key mismatch", e))?;

        Ok(Self::from_parts(ca_cert, key, cert_pem.trim_end().to_string()))
    }

    fn from_parts(ca_cert: Certificate, ca_key: KeyPair, root_pem: String) -> Self {
        Self {
            ca_cert,
            ca_key,
            root_pem,
            required_credential: None,
            publish_root_bundle: true,
            signed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Reject CSRs unless the caller presents exactly this credential.
    pub fn with_required_credential(mut self, credential: impl Into<SecretString>) -> Self {
        self.required_credential = Some(credential.into());
        self
    }

    /// When disabled, `get_root_cert_bundle` returns an empty list and roots are
    /// only available from signed chains.
    pub fn with_root_bundle(mut self, publish: bool) -> Self {
        self.publish_root_bundle = publish;
        self
    }

    pub fn root_cert_pem(&self) -> &str {
        &self.root_pem
    }

    /// Number of CSRs signed so far.
    pub fn signed_count(&self) -> u64 {
        self.signed.load(Ordering::Relaxed)
    }

    fn authorize(&self, credential: Option<&SecretString>) -> Result<()> {
        match (&self.required_credential, credential) {
            (None, _) => Ok(()),
            (Some(required), Some(presented)) if required == presented => Ok(()),
            (Some(_), Some(_)) => Err(SecretsError::signing("CA rejected the presented credential")),
            (Some(_), None) => Err(SecretsError::signing("CA requires a credential")),
        }
    }
}

#[async_trait]
impl CaClient for LocalCaClient {
    async fn csr_sign(
        &self,
        csr_pem: &[u8],
        validity_secs: i64,
        credential: Option<&SecretString>,
    ) -> Result<Vec<String>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SecretsError::signing("CA client is closed"));
        }
        self.authorize(credential)?;

        if validity_secs <= 0 {
            return Err(SecretsError::signing(format!(
                "requested validity must be positive (got {})",
                validity_secs
            )));
        }

        let csr_str = std::str::from_utf8(csr_pem)
            .map_err(|e| SecretsError::signing(format!("CSR is not valid UTF-8: {}", e)))?;
        let mut csr = CertificateSigningRequestParams::from_pem(csr_str)
            .map_err(|e| ca_error("invalid CSR", e))?;

        csr.params.is_ca = IsCa::ExplicitNoCa;
        csr.params.key_usages =
            vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        csr.params.extended_key_usages =
            vec![ExtendedKeyUsagePurpose::ServerAuth, ExtendedKeyUsagePurpose::ClientAuth];
        let now = OffsetDateTime::now_utc();
        csr.params.not_before = now;
        csr.params.not_after =
            now.checked_add(time::Duration::seconds(validity_secs)).ok_or_else(|| {
                SecretsError::signing(format!(
                    "requested validity of {} seconds is out of range",
                    validity_secs
                ))
            })?;

        let leaf = csr
            .signed_by(&self.ca_cert, &self.ca_key)
            .map_err(|e| ca_error("failed to sign CSR", e))?;

        let count = self.signed.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(validity_secs, signed = count, "Signed workload CSR");

        Ok(vec![leaf.pem(), self.root_pem.clone()])
    }

    async fn get_root_cert_bundle(&self) -> Result<Vec<String>> {
        if self.publish_root_bundle {
            Ok(vec![self.root_pem.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn provider_name(&self) -> &str {
        LOCAL_CA_PROVIDER
    }
}
