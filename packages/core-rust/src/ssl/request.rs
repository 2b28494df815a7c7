use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue};
use serde::{Deserialize, Serialize};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

use super::{common_name, decode_pem, fingerprint, PrivateKey};
use crate::error::SslError;

const KIND: &str = "certificate request";

/// PKCS#10 certificate signing request, serialized as its PEM text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificateRequest {
    pem: String,
    der: Vec<u8>,
    subject: String,
}

impl CertificateRequest {
    /// Builds a request for `subject` signed with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::Generation`] when `rcgen` cannot serialize the request.
    pub fn generate(subject: &str, key: &PrivateKey) -> Result<Self, SslError> {
        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, DnValue::Utf8String(subject.to_string()));
        let pem = params
            .serialize_request(key.key_pair())
            .and_then(|csr| csr.pem())
            .map_err(SslError::generation(KIND))?;
        Self::from_pem(&pem)
    }

    /// # Errors
    ///
    /// Returns [`SslError::Malformed`] when the text is not a PEM-armored CSR.
    pub fn from_pem(pem: &str) -> Result<Self, SslError> {
        let der = decode_pem(KIND, pem)?.contents;
        let (_, csr) =
            X509CertificationRequest::from_der(&der).map_err(|e| SslError::malformed(KIND, e))?;
        let subject = common_name(&csr.certification_request_info.subject);
        Ok(Self {
            pem: pem.to_string(),
            der,
            subject,
        })
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// SHA-256 fingerprint of the DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.der)
    }

    /// Proves possession of the private key matching the embedded public key.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::InvalidSignature`] when the self-signature fails.
    pub fn verify(&self) -> Result<(), SslError> {
        let (_, csr) = X509CertificationRequest::from_der(&self.der)
            .map_err(|e| SslError::malformed(KIND, e))?;
        csr.verify_signature()
            .map_err(|_| SslError::InvalidSignature {
                subject: self.subject.clone(),
            })
    }
}

impl TryFrom<String> for CertificateRequest {
    type Error = SslError;

    fn try_from(pem: String) -> Result<Self, Self::Error> {
        Self::from_pem(&pem)
    }
}

impl From<CertificateRequest> for String {
    fn from(csr: CertificateRequest) -> Self {
        csr.pem
    }
}
