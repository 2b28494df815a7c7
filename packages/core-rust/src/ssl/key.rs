//! Key pairs and fingerprints.

use std::fmt;

use rcgen::KeyPair;
use sha2::{Digest, Sha256};

use crate::error::SslError;

/// Private key of a host or of the CA (ECDSA P-256).
pub struct PrivateKey {
    key_pair: KeyPair,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &fingerprint(&self.public_key_der()))
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Generates a fresh key pair from OS entropy.
    ///
    /// # Errors
    ///
    /// Returns [`SslError::Generation`] when the key cannot be created.
    pub fn generate() -> Result<Self, SslError> {
        let key_pair = KeyPair::generate().map_err(SslError::generation("private key"))?;
        Ok(Self { key_pair })
    }

    /// DER-encoded `SubjectPublicKeyInfo` of the public half.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key_der()
    }

    /// PKCS#8 PEM.
    #[must_use]
    pub fn to_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    /// # Errors
    ///
    /// Returns [`SslError::Malformed`] when the PEM does not hold a usable key.
    pub fn from_pem(pem: &str) -> Result<Self, SslError> {
        let key_pair = KeyPair::from_pem(pem).map_err(|e| SslError::malformed("private key", e))?;
        Ok(Self { key_pair })
    }

    pub(crate) fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

/// Uppercase, colon-separated SHA-256 digest (`AB:CD:...`).
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = hex::encode_upper(Sha256::digest(bytes));
    digest
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}
