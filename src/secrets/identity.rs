//! Workload identity resolution.
//!
//! Decides which identity claims (SANs) go into a workload CSR. The default
//! policy reads the Kubernetes service account from the bootstrap token's
//! `sub` claim, falls back to the configured namespace/service account, and
//! finally applies [`IdentityFallback`].

use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::config::{IdentityFallback, SecurityOptions};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use tracing::debug;

const K8S_SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Maximum length of a namespace or service account component.
const MAX_COMPONENT_LEN: usize = 128;

/// Resolves the identity claims to embed in a workload CSR.
pub trait IdentityResolver: Send + Sync + std::fmt::Debug {
    /// `token` is the credential the agent is about to present to the CA, if any.
    fn resolve(&self, resource_name: &str, token: Option<&SecretString>) -> Result<Vec<String>>;
}

/// Kubernetes-flavoured SPIFFE identity policy.
#[derive(Debug, Clone)]
pub struct KubernetesIdentityResolver {
    trust_domain: String,
    namespace: Option<String>,
    service_account: Option<String>,
    fallback: IdentityFallback,
}

impl KubernetesIdentityResolver {
    pub fn new(options: &SecurityOptions) -> Self {
        Self {
            trust_domain: options.trust_domain.clone(),
            namespace: options.workload_namespace.clone(),
            service_account: options.service_account.clone(),
            fallback: options.identity_fallback,
        }
    }
}

impl IdentityResolver for KubernetesIdentityResolver {
    fn resolve(&self, resource_name: &str, token: Option<&SecretString>) -> Result<Vec<String>> {
        if let Some(subject) = token.and_then(|t| unverified_subject(t.expose_secret())) {
            match spiffe_id_from_k8s_subject(&self.trust_domain, &subject) {
                Ok(Some(identity)) => {
                    debug!(identity = %identity, "Resolved identity from token subject");
                    return Ok(vec![identity]);
                }
                Ok(None) => {
                    debug!("Token subject is not a Kubernetes service account");
                }
                Err(e) => return Err(e),
            }
        }

        if let (Some(ns), Some(sa)) = (self.namespace.as_deref(), self.service_account.as_deref())
        {
            if !ns.is_empty() && !sa.is_empty() {
                return Ok(vec![spiffe_id(&self.trust_domain, ns, sa)?]);
            }
        }

        match self.fallback {
            IdentityFallback::ResourceName if !resource_name.is_empty() => {
                debug!(resource_name = %resource_name, "Using resource name as identity");
                Ok(vec![resource_name.to_string()])
            }
            _ => Err(SecretsError::identity(format!(
                "no workload identity available for resource '{}'",
                resource_name
            ))),
        }
    }
}

/// Build `spiffe://<trust_domain>/ns/<namespace>/sa/<service_account>`.
pub fn spiffe_id(trust_domain: &str, namespace: &str, service_account: &str) -> Result<String> {
    validate_spiffe_component(namespace, "namespace")?;
    validate_spiffe_component(service_account, "service account")?;
    Ok(format!("spiffe://{}/ns/{}/sa/{}", trust_domain, namespace, service_account))
}

/// Map a `system:serviceaccount:<ns>:<sa>` subject to a SPIFFE identity.
///
/// Returns `Ok(None)` for subjects in any other format and an error when the
/// subject has the Kubernetes shape but unusable components.
pub fn spiffe_id_from_k8s_subject(trust_domain: &str, subject: &str) -> Result<Option<String>> {
    let Some(rest) = subject.strip_prefix(K8S_SERVICE_ACCOUNT_PREFIX) else {
        return Ok(None);
    };

    let Some((namespace, service_account)) = rest.split_once(':') else {
        return Err(SecretsError::identity(format!(
            "malformed Kubernetes service account subject '{}'",
            subject
        )));
    };

    spiffe_id(trust_domain, namespace, service_account).map(Some)
}

/// Validate a SPIFFE path component so it cannot inject path segments,
/// an authority or a scheme into the resulting URI.
pub fn validate_spiffe_component(component: &str, component_name: &str) -> Result<()> {
    if component.is_empty() {
        return Err(SecretsError::identity(format!("SPIFFE {} cannot be empty", component_name)));
    }

    if component.len() > MAX_COMPONENT_LEN {
        return Err(SecretsError::identity(format!(
            "SPIFFE {} exceeds maximum length of {} characters (got {})",
            component_name,
            MAX_COMPONENT_LEN,
            component.len()
        )));
    }

    for (needle, what) in [("/", "path separator"), ("@", "authority"), (":", "port separator")] {
        if component.contains(needle) {
            return Err(SecretsError::identity(format!(
                "SPIFFE {} cannot contain '{}' ({})",
                component_name, needle, what
            )));
        }
    }

    if component.contains("..") {
        return Err(SecretsError::identity(format!(
            "SPIFFE {} cannot contain '..'",
            component_name
        )));
    }

    Ok(())
}

#[derive(Deserialize)]
struct SubjectClaim {
    sub: Option<String>,
}

/// Read the `sub` claim of a JWT without verifying it. The CA verifies the token;
/// the agent only needs the claim to choose SANs.
pub(crate) fn unverified_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<SubjectClaim>(&bytes).ok()?.sub
}
