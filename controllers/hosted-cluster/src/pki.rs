//! Self-signed CAs and CA-signed serving certificates.
//!
//! Used for the ignition server's CA and serving secrets and for the Cluster
//! API webhook serving secret. Everything is generated once and then kept:
//! callers only invoke these helpers when the target secret has no material.

use std::net::IpAddr;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, SanType, string::Ia5String,
};

use crate::error::ControllerError;

/// Validity of generated CA certificates
pub const CA_VALIDITY_YEARS: i64 = 10;

/// Validity of generated serving certificates
pub const SERVING_CERT_VALIDITY_YEARS: i64 = 1;

fn compute_validity(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    (now, now + ::time::Duration::days(years * 365))
}

/// PEM encoded certificate and private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateKeyPair {
    /// Certificate, PEM
    pub cert_pem: String,
    /// Private key, PEM
    pub key_pem: String,
}

/// Certificate authority able to sign serving certificates
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    pair: CertificateKeyPair,
}

impl CertificateAuthority {
    /// Generate a new self-signed CA
    pub fn generate(common_name: &str, organizational_unit: &str) -> Result<Self, ControllerError> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
        dn.push(
            DnType::OrganizationalUnitName,
            DnValue::Utf8String(organizational_unit.to_string()),
        );
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        let (not_before, not_after) = compute_validity(CA_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate()
            .map_err(|e| ControllerError::Pki(format!("failed to generate CA key: {e}")))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| ControllerError::Pki(format!("failed to self-sign CA {common_name}: {e}")))?;

        Ok(Self {
            pair: CertificateKeyPair {
                cert_pem: cert.pem(),
                key_pem: key_pair.serialize_pem(),
            },
        })
    }

    /// Load a CA from stored PEM material
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, ControllerError> {
        KeyPair::from_pem(key_pem).map_err(|e| ControllerError::Pki(format!("invalid CA key: {e}")))?;
        Ok(Self {
            pair: CertificateKeyPair {
                cert_pem: cert_pem.to_string(),
                key_pem: key_pem.to_string(),
            },
        })
    }

    /// CA certificate and key
    pub fn pair(&self) -> &CertificateKeyPair {
        &self.pair
    }

    /// Issue a server certificate for `hosts` (DNS names or IP addresses)
    pub fn issue_serving_cert(
        &self,
        common_name: &str,
        organization: &str,
        hosts: &[&str],
    ) -> Result<CertificateKeyPair, ControllerError> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
        dn.push(DnType::OrganizationName, DnValue::Utf8String(organization.to_string()));
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];
        let (not_before, not_after) = compute_validity(SERVING_CERT_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;
        params.subject_alt_names = hosts
            .iter()
            .map(|host| match host.parse::<IpAddr>() {
                Ok(ip) => Ok(SanType::IpAddress(ip)),
                Err(_) => Ia5String::try_from((*host).to_string())
                    .map(SanType::DnsName)
                    .map_err(|e| ControllerError::Pki(format!("invalid DNS name '{host}': {e}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key_pair = KeyPair::generate()
            .map_err(|e| ControllerError::Pki(format!("failed to generate serving key: {e}")))?;
        let ca_key = KeyPair::from_pem(&self.pair.key_pem)
            .map_err(|e| ControllerError::Pki(format!("invalid CA key: {e}")))?;
        let issuer = Issuer::from_ca_cert_pem(&self.pair.cert_pem, &ca_key)
            .map_err(|e| ControllerError::Pki(format!("failed to load CA certificate: {e}")))?;
        let cert = params
            .signed_by(&key_pair, &issuer)
            .map_err(|e| ControllerError::Pki(format!("failed to sign {common_name}: {e}")))?;

        Ok(CertificateKeyPair {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}
