use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, DnValue, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SerialNumber,
};
use serde::{Deserialize, Serialize};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use super::{common_name, datetime, decode_pem, fingerprint, serial_from_bytes};
use super::{CertificateRequest, PrivateKey};
use crate::error::SslError;

const KIND: &str = "certificate";

/// Validity window in seconds since the Unix epoch; both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: i64,
    pub not_after: i64,
}

impl Validity {
    /// Window opening at `now` and lasting `ttl_secs`.
    #[must_use]
    pub fn starting_at(now: i64, ttl_secs: i64) -> Self {
        Self {
            not_before: now,
            not_after: now.saturating_add(ttl_secs),
        }
    }

    #[must_use]
    pub fn contains(&self, now: i64) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    fn apply(self, params: &mut CertificateParams) -> Result<(), SslError> {
        params.not_before = datetime(KIND, self.not_before)?;
        params.not_after = datetime(KIND, self.not_after)?;
        Ok(())
    }
}

/// Parsed X.509 certificate, serialized as its PEM text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Certificate {
    pem: String,
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial: u64,
    validity: Validity,
    is_ca: bool,
    public_key_der: Vec<u8>,
}

impl Certificate {
    /// Self-signed CA certificate for `name`, allowed to sign certificates and CRLs.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::Generation`] when signing fails.
    pub fn self_signed_authority(
        name: &str,
        key: &PrivateKey,
        serial: u64,
        validity: Validity,
    ) -> Result<Self, SslError> {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject_name(name);
        params.serial_number = Some(SerialNumber::from(serial));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        validity.apply(&mut params)?;
        let cert = params
            .self_signed(key.key_pair())
            .map_err(SslError::generation(KIND))?;
        Self::from_pem(&cert.pem())
    }

    /// Signs `csr` as a leaf certificate issued by `issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::Generation`] when the request cannot be re-read or
    /// signed.
    pub fn issue(
        csr: &CertificateRequest,
        issuer: &Certificate,
        issuer_key: &PrivateKey,
        serial: u64,
        validity: Validity,
    ) -> Result<Self, SslError> {
        let mut request = CertificateSigningRequestParams::from_pem(csr.pem())
            .map_err(SslError::generation(KIND))?;
        let params = &mut request.params;
        params.distinguished_name = subject_name(csr.subject());
        params.serial_number = Some(SerialNumber::from(serial));
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.use_authority_key_identifier_extension = true;
        validity.apply(params)?;

        let authority = issuer.signer(issuer_key)?;
        let cert = request
            .signed_by(&authority, issuer_key.key_pair())
            .map_err(SslError::generation(KIND))?;
        Self::from_pem(&cert.pem())
    }

    /// # Errors
    ///
    /// Returns [`SslError::Malformed`] when the text is not a PEM-armored
    /// X.509 certificate.
    pub fn from_pem(pem: &str) -> Result<Self, SslError> {
        let der = decode_pem(KIND, pem)?.contents;
        let (_, cert) = X509Certificate::from_der(&der).map_err(|e| SslError::malformed(KIND, e))?;
        let serial = serial_from_bytes(cert.raw_serial())
            .ok_or_else(|| SslError::malformed(KIND, "serial wider than 64 bits"))?;
        let is_ca = cert
            .basic_constraints()
            .ok()
            .flatten()
            .is_some_and(|ext| ext.value.ca);
        Ok(Self {
            subject: common_name(cert.subject()),
            issuer: common_name(cert.issuer()),
            serial,
            validity: Validity {
                not_before: cert.validity().not_before.timestamp(),
                not_after: cert.validity().not_after.timestamp(),
            },
            is_ca,
            public_key_der: cert.public_key().raw.to_vec(),
            pem: pem.to_string(),
            der,
        })
    }

    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn validity(&self) -> Validity {
        self.validity
    }

    #[must_use]
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// SHA-256 fingerprint of the DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.der)
    }

    /// Whether `key` is the private half of this certificate's public key.
    #[must_use]
    pub fn matches_key(&self, key: &PrivateKey) -> bool {
        key.public_key_der() == self.public_key_der
    }

    /// # Errors
    ///
    /// Returns [`SslError::Expired`] when `now` (epoch seconds) falls outside
    /// the validity window.
    pub fn check_validity(&self, now: i64) -> Result<(), SslError> {
        if !self.validity.contains(now) {
            return Err(SslError::Expired {
                subject: self.subject.clone(),
                now,
                not_before: self.validity.not_before,
                not_after: self.validity.not_after,
            });
        }
        Ok(())
    }

    /// Checks the issuer's signature and the validity window.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::InvalidSignature`] or [`SslError::Expired`].
    pub fn verify(&self, issuer: &Certificate, now: i64) -> Result<(), SslError> {
        let (_, cert) =
            X509Certificate::from_der(&self.der).map_err(|e| SslError::malformed(KIND, e))?;
        let (_, authority) =
            X509Certificate::from_der(&issuer.der).map_err(|e| SslError::malformed(KIND, e))?;
        cert.verify_signature(Some(authority.public_key()))
            .map_err(|_| SslError::InvalidSignature {
                subject: self.subject.clone(),
            })?;
        self.check_validity(now)
    }

    /// `rcgen` handle able to sign with this (CA) certificate's identity.
    pub(crate) fn signer(&self, key: &PrivateKey) -> Result<rcgen::Certificate, SslError> {
        CertificateParams::from_ca_cert_pem(&self.pem)
            .and_then(|params| params.self_signed(key.key_pair()))
            .map_err(SslError::generation(KIND))
    }
}

fn subject_name(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    name
}

impl TryFrom<String> for Certificate {
    type Error = SslError;

    fn try_from(pem: String) -> Result<Self, Self::Error> {
        Self::from_pem(&pem)
    }
}

impl From<Certificate> for String {
    fn from(cert: Certificate) -> Self {
        cert.pem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 24 * 60 * 60;

    fn authority() -> (PrivateKey, Certificate) {
        let key = PrivateKey::generate().unwrap();
        let cert =
            Certificate::self_signed_authority("Test CA", &key, 1, Validity::starting_at(NOW, 365 * DAY))
                .unwrap();
        (key, cert)
    }

    #[test]
    fn authority_certificate_is_self_signed_ca() {
        let (key, ca) = authority();
        assert_eq!(ca.subject(), "Test CA");
        assert_eq!(ca.issuer(), "Test CA");
        assert_eq!(ca.serial(), 1);
        assert!(ca.is_ca());
        assert!(ca.matches_key(&key));
        assert!(ca.pem().starts_with("-----BEGIN CERTIFICATE-----"));
        ca.verify(&ca, NOW).unwrap();
    }

    #[test]
    fn issued_certificate_verifies_against_issuer() {
        let (ca_key, ca) = authority();
        let host_key = PrivateKey::generate().unwrap();
        let csr = CertificateRequest::generate("web01", &host_key).unwrap();
        let cert =
            Certificate::issue(&csr, &ca, &ca_key, 2, Validity::starting_at(NOW, 30 * DAY)).unwrap();

        assert_eq!(cert.subject(), "web01");
        assert_eq!(cert.issuer(), "Test CA");
        assert_eq!(cert.serial(), 2);
        assert!(!cert.is_ca());
        assert!(cert.matches_key(&host_key));
        assert!(!cert.matches_key(&ca_key));
        cert.verify(&ca, NOW + DAY).unwrap();

        let (_, other_ca) = authority();
        assert!(matches!(
            cert.verify(&other_ca, NOW + DAY),
            Err(SslError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn validity_window_is_inclusive() {
        let (_, ca) = authority();
        let window = ca.validity();
        assert_eq!(window.not_before, NOW);
        assert!(ca.check_validity(window.not_before).is_ok());
        assert!(ca.check_validity(window.not_after).is_ok());
        assert!(matches!(
            ca.check_validity(window.not_before - 1),
            Err(SslError::Expired { .. })
        ));
        assert!(matches!(
            ca.check_validity(window.not_after + 1),
            Err(SslError::Expired { .. })
        ));
    }

    #[test]
    fn pem_round_trips_through_serde() {
        let (_, ca) = authority();
        let json = serde_json::to_string(&ca).unwrap();
        let back: Certificate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ca);
        assert_eq!(back.fingerprint(), ca.fingerprint());
    }
}
