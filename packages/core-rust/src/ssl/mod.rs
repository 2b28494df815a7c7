//! X.509 primitives: keys, certificate requests, certificates and revocation lists.
//!
//! Artifacts are generated and signed with `rcgen` and read back with
//! `x509-parser`; no DER or PEM is assembled by hand. Each parsed artifact
//! keeps its PEM text, which is also its serde representation.

pub mod certificate;
pub mod crl;
pub mod key;
pub mod request;

pub use certificate::{Certificate, Validity};
pub use crl::{CertificateRevocationList, Revocation};
pub use key::{fingerprint, PrivateKey};
pub use request::CertificateRequest;

use x509_parser::pem::{parse_x509_pem, Pem};
use x509_parser::x509::X509Name;

use crate::error::SslError;

/// Decodes the first PEM block of `text`.
fn decode_pem(kind: &'static str, text: &str) -> Result<Pem, SslError> {
    let (_, pem) = parse_x509_pem(text.as_bytes()).map_err(|e| SslError::malformed(kind, e))?;
    if pem.contents.is_empty() {
        return Err(SslError::malformed(kind, "empty PEM block"));
    }
    Ok(pem)
}

/// First common name of `name`, or its full DN string.
fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map_or_else(|| name.to_string(), ToString::to_string)
}

/// Big-endian DER integer bytes to `u64`; `None` when wider than 64 bits.
fn serial_from_bytes(raw: &[u8]) -> Option<u64> {
    let significant: Vec<u8> = raw.iter().copied().skip_while(|b| *b == 0).collect();
    if significant.len() > 8 {
        return None;
    }
    Some(significant.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b)))
}

fn datetime(kind: &'static str, secs: i64) -> Result<time::OffsetDateTime, SslError> {
    time::OffsetDateTime::from_unix_timestamp(secs).map_err(|e| SslError::malformed(kind, e))
}
