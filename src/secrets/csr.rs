//! Key pair and certificate signing request construction, plus the certificate
//! parsing the manager needs to compute expiry.
//!
//! The CSR context (key pair + identities) lives only for the duration of one
//! issuance attempt; the private key leaves this module as a [`SecretString`].

use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::config::KeyAlgorithm;
use chrono::{DateTime, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, Ia5String, KeyPair, SanType,
    SignatureAlgorithm, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384, PKCS_ED25519,
};
use std::net::IpAddr;
use x509_parser::pem::Pem;

/// Output of CSR generation: the PEM request and its private key.
#[derive(Debug)]
pub struct CsrBundle {
    pub csr_pem: String,
    pub private_key: SecretString,
}

fn signature_algorithm(algorithm: KeyAlgorithm) -> &'static SignatureAlgorithm {
    match algorithm {
        KeyAlgorithm::EcdsaP256 => &PKCS_ECDSA_P256_SHA256,
        KeyAlgorithm::EcdsaP384 => &PKCS_ECDSA_P384_SHA384,
        KeyAlgorithm::Ed25519 => &PKCS_ED25519,
    }
}

/// Map an identity claim to a SAN: `spiffe://` URIs become URI SANs, IP literals
/// IP SANs, anything else a DNS SAN.
fn subject_alt_name(identity: &str) -> Result<SanType> {
    if identity.contains("://") {
        let uri = Ia5String::try_from(identity.to_string())
            .map_err(|e| SecretsError::key_generation(format!("invalid URI SAN: {}", e)))?;
        return Ok(SanType::URI(uri));
    }

    if let Ok(ip) = identity.parse::<IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }

    let dns = Ia5String::try_from(identity.to_string())
        .map_err(|e| SecretsError::key_generation(format!("invalid DNS SAN: {}", e)))?;
    Ok(SanType::DnsName(dns))
}

/// Generate a fresh key pair and a PKCS#10 request carrying `identities` as SANs.
pub fn generate_csr(
    algorithm: KeyAlgorithm,
    trust_domain: &str,
    identities: &[String],
) -> Result<CsrBundle> {
    if identities.is_empty() {
        return Err(SecretsError::identity("no identities to embed in the CSR"));
    }

    let key_pair = KeyPair::generate_for(signature_algorithm(algorithm))?;

    let mut params = CertificateParams::default();
    let mut subject = DistinguishedName::new();
    subject.push(DnType::OrganizationName, trust_domain);
    params.distinguished_name = subject;
    params.subject_alt_names =
        identities.iter().map(|id| subject_alt_name(id)).collect::<Result<Vec<_>>>()?;

    let csr_pem = params.serialize_request(&key_pair)?.pem()?;

    Ok(CsrBundle { csr_pem, private_key: SecretString::new(key_pair.serialize_pem()) })
}

/// NotAfter of the first certificate in `pem`.
pub fn leaf_not_after(pem: &str) -> Result<DateTime<Utc>> {
    let first = Pem::iter_from_buffer(pem.as_bytes())
        .next()
        .ok_or_else(|| SecretsError::certificate_parse("no PEM block found"))?
        .map_err(|e| SecretsError::certificate_parse(format!("invalid PEM: {}", e)))?;

    not_after_of(&first)
}

/// Earliest NotAfter across every certificate in every PEM string.
pub fn earliest_not_after(pems: &[String]) -> Result<DateTime<Utc>> {
    let mut earliest: Option<DateTime<Utc>> = None;

    for pem_str in pems {
        for block in Pem::iter_from_buffer(pem_str.as_bytes()) {
            let block =
                block.map_err(|e| SecretsError::certificate_parse(format!("invalid PEM: {}", e)))?;
            let not_after = not_after_of(&block)?;
            earliest = Some(earliest.map_or(not_after, |current| current.min(not_after)));
        }
    }

    earliest.ok_or_else(|| SecretsError::certificate_parse("no certificates in bundle"))
}

fn not_after_of(block: &Pem) -> Result<DateTime<Utc>> {
    let cert = block
        .parse_x509()
        .map_err(|e| SecretsError::certificate_parse(format!("invalid certificate: {}", e)))?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| SecretsError::certificate_parse("NotAfter out of range"))
}

/// Join PEM strings into one buffer, each block newline-terminated.
pub fn concat_pem(pems: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for pem in pems {
        out.extend_from_slice(pem.trim_end().as_bytes());
        out.push(b'\n');
    }
    out
}
