use rcgen::{CertificateRevocationListParams, KeyIdMethod, RevokedCertParams, SerialNumber};
use serde::{Deserialize, Serialize};
use x509_parser::prelude::FromDer;
use x509_parser::revocation_list::CertificateRevocationList as X509Crl;

use super::{common_name, datetime, decode_pem, serial_from_bytes};
use super::{Certificate, PrivateKey, Validity};
use crate::error::SslError;

const KIND: &str = "certificate revocation list";

/// One revoked certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revocation {
    pub serial: u64,
    /// Seconds since the Unix epoch.
    pub revoked_at: i64,
}

/// X.509 CRL signed by the CA, serialized as its PEM text.
///
/// The CRL number equals the number of revocations, so it grows with every
/// reissue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificateRevocationList {
    pem: String,
    issuer: String,
    revocations: Vec<Revocation>,
}

impl CertificateRevocationList {
    /// Signs a list holding `revocations`, valid over `window`.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::Generation`] when signing fails.
    pub fn issue(
        authority: &Certificate,
        key: &PrivateKey,
        revocations: Vec<Revocation>,
        window: Validity,
    ) -> Result<Self, SslError> {
        let revoked_certs = revocations
            .iter()
            .map(|r| {
                Ok(RevokedCertParams {
                    serial_number: SerialNumber::from(r.serial),
                    revocation_time: datetime(KIND, r.revoked_at)?,
                    reason_code: None,
                    invalidity_date: None,
                })
            })
            .collect::<Result<Vec<_>, SslError>>()?;
        let params = CertificateRevocationListParams {
            this_update: datetime(KIND, window.not_before)?,
            next_update: datetime(KIND, window.not_after)?,
            crl_number: SerialNumber::from(u64::try_from(revocations.len()).unwrap_or(u64::MAX)),
            issuing_distribution_point: None,
            revoked_certs,
            key_identifier_method: KeyIdMethod::Sha256,
        };
        let signer = authority.signer(key)?;
        let pem = params
            .signed_by(&signer, key.key_pair())
            .and_then(|crl| crl.pem())
            .map_err(SslError::generation(KIND))?;
        Self::from_pem(&pem)
    }

    /// Reissues the list with `certificate` appended.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::Generation`] when signing fails.
    pub fn revoke(
        &self,
        certificate: &Certificate,
        authority: &Certificate,
        key: &PrivateKey,
        window: Validity,
    ) -> Result<Self, SslError> {
        let mut revocations = self.revocations.clone();
        revocations.push(Revocation {
            serial: certificate.serial(),
            revoked_at: window.not_before,
        });
        Self::issue(authority, key, revocations, window)
    }

    /// # Errors
    ///
    /// Returns [`SslError::Malformed`] when the text is not a PEM-armored CRL.
    pub fn from_pem(pem: &str) -> Result<Self, SslError> {
        let der = decode_pem(KIND, pem)?.contents;
        let (_, crl) = X509Crl::from_der(&der).map_err(|e| SslError::malformed(KIND, e))?;
        let revocations = crl
            .iter_revoked_certificates()
            .map(|revoked| {
                let serial = serial_from_bytes(revoked.raw_serial())
                    .ok_or_else(|| SslError::malformed(KIND, "serial wider than 64 bits"))?;
                Ok(Revocation {
                    serial,
                    revoked_at: revoked.revocation_date.timestamp(),
                })
            })
            .collect::<Result<Vec<_>, SslError>>()?;
        Ok(Self {
            pem: pem.to_string(),
            issuer: common_name(&crl.tbs_cert_list.issuer),
            revocations,
        })
    }

    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn revocations(&self) -> &[Revocation] {
        &self.revocations
    }

    #[must_use]
    pub fn is_revoked(&self, serial: u64) -> bool {
        self.revocations.iter().any(|r| r.serial == serial)
    }

    /// # Errors
    ///
    /// Returns [`SslError::Revoked`] when `certificate` is on the list.
    pub fn check(&self, certificate: &Certificate) -> Result<(), SslError> {
        if self.is_revoked(certificate.serial()) {
            return Err(SslError::Revoked {
                subject: certificate.subject().to_string(),
                serial: certificate.serial(),
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for CertificateRevocationList {
    type Error = SslError;

    fn try_from(pem: String) -> Result<Self, Self::Error> {
        Self::from_pem(&pem)
    }
}

impl From<CertificateRevocationList> for String {
    fn from(crl: CertificateRevocationList) -> Self {
        crl.pem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssl::CertificateRequest;

    const NOW: i64 = 1_700_000_000;
    const YEAR: i64 = 365 * 24 * 60 * 60;

    fn window() -> Validity {
        Validity::starting_at(NOW, YEAR)
    }

    fn leaf(serial: u64, ca: &Certificate, ca_key: &PrivateKey) -> Certificate {
        let key = PrivateKey::generate().unwrap();
        let csr = CertificateRequest::generate(&format!("host{serial}"), &key).unwrap();
        Certificate::issue(&csr, ca, ca_key, serial, window()).unwrap()
    }

    #[test]
    fn revoke_appends_serials() {
        let ca_key = PrivateKey::generate().unwrap();
        let ca = Certificate::self_signed_authority("Test CA", &ca_key, 1, window()).unwrap();
        let crl = CertificateRevocationList::issue(&ca, &ca_key, Vec::new(), window()).unwrap();
        assert!(crl.pem().starts_with("-----BEGIN X509 CRL-----"));
        assert_eq!(crl.issuer(), "Test CA");
        assert!(crl.revocations().is_empty());

        let c2 = leaf(2, &ca, &ca_key);
        let c3 = leaf(3, &ca, &ca_key);
        let updated = crl.revoke(&c2, &ca, &ca_key, window()).unwrap();
        assert!(updated.is_revoked(2));
        assert!(!updated.is_revoked(3));
        assert_eq!(updated.revocations()[0].revoked_at, NOW);
        assert!(matches!(
            updated.check(&c2),
            Err(SslError::Revoked { serial: 2, ref subject }) if subject == "host2"
        ));
        assert!(updated.check(&c3).is_ok());

        let reread = CertificateRevocationList::from_pem(updated.pem()).unwrap();
        assert_eq!(reread, updated);
    }
}
