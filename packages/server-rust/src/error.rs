//! Dispatch error taxonomy.
//!
//! Absence is never an error: `find` returns `Ok(None)` and `search` returns
//! `Ok(vec![])` when nothing matches.

use indirector_core::{FormatError, IndirectionName, Operation, SslError};

/// Errors returned by indirections, termini and the certificate authority.
#[derive(Debug, thiserror::Error)]
pub enum IndirectorError {
    /// Unknown terminus/cache class, wrong model type, failed terminus
    /// construction, or a process that is not a valid CA. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{terminus} terminus of {indirection} does not support {operation}")]
    NotSupported {
        indirection: IndirectionName,
        terminus: &'static str,
        operation: Operation,
    },

    /// Transport failure or non-success status from a remote peer.
    #[error("remote error: {0}")]
    Remote(String),

    /// A certificate-authority precondition was violated.
    #[error("{0}")]
    State(String),

    /// The requester is not allowed to perform the operation.
    #[error("{requester} may not {action}")]
    Forbidden { requester: String, action: String },

    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Ssl(#[from] SslError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndirectorError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        IndirectorError::Configuration(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        IndirectorError::State(message.into())
    }

    pub(crate) fn remote(message: impl Into<String>) -> Self {
        IndirectorError::Remote(message.into())
    }
}

impl From<reqwest::Error> for IndirectorError {
    fn from(err: reqwest::Error) -> Self {
        IndirectorError::Remote(err.to_string())
    }
}

/// Result alias used throughout the server crate.
pub type IndirectorResult<T> = Result<T, IndirectorError>;
