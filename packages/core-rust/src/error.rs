//! Model-level error types shared by every consumer of the core crate.

use thiserror::Error;

/// Failure to encode or decode a model in one of the wire [`Format`](crate::Format)s.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("could not encode {model} as {format}: {reason}")]
    Encode {
        model: &'static str,
        format: &'static str,
        reason: String,
    },
    #[error("could not decode {model} from {format}: {reason}")]
    Decode {
        model: &'static str,
        format: &'static str,
        reason: String,
    },
    #[error("unsupported content type: {0}")]
    UnsupportedMime(String),
}

/// Failures raised by the X.509 primitives: keys, requests, certificates and CRLs.
#[derive(Debug, Error)]
pub enum SslError {
    #[error("malformed {kind}: {reason}")]
    Malformed { kind: &'static str, reason: String },
    #[error("could not generate {kind}: {source}")]
    Generation {
        kind: &'static str,
        #[source]
        source: rcgen::Error,
    },
    #[error("signature verification failed for {subject}")]
    InvalidSignature { subject: String },
    #[error("certificate revoked: {subject} (serial {serial})")]
    Revoked { subject: String, serial: u64 },
    /// Validity bounds are seconds since the Unix epoch.
    #[error("certificate for {subject} is not valid at {now} (valid {not_before}..{not_after})")]
    Expired {
        subject: String,
        now: i64,
        not_before: i64,
        not_after: i64,
    },
}

impl SslError {
    pub(crate) fn malformed(kind: &'static str, reason: impl ToString) -> Self {
        SslError::Malformed {
            kind,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn generation(kind: &'static str) -> impl FnOnce(rcgen::Error) -> Self {
        move |source| SslError::Generation { kind, source }
    }
}
