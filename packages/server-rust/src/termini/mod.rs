//! Terminus implementations.

pub mod broker;
pub mod certificate_status;
pub mod code;
pub mod file;
pub mod memory;
pub mod queue;
pub mod rest;

use regex::Regex;

use crate::error::{IndirectorError, IndirectorResult};

pub use broker::{Broker, DirectoryBroker, MemoryBroker};
pub use certificate_status::CertificateStatusTerminus;
pub use code::{
    Compiler, CompilerTerminus, FactSource, FacterTerminus, PlainNodeTerminus, SystemFactSource,
};
pub use file::FileTerminus;
pub use memory::MemoryTerminus;
pub use queue::{QueueHandler, QueueSubscription, QueueTerminus};
pub use rest::RestTerminus;

/// Search key interpreted as a regular expression over instance keys.
///
/// `*` and the empty string match everything.
#[derive(Debug, Clone)]
pub struct KeyPattern(Option<Regex>);

impl KeyPattern {
    /// # Errors
    ///
    /// Returns [`IndirectorError::InvalidKey`] for a malformed expression.
    pub fn parse(pattern: &str) -> IndirectorResult<Self> {
        if pattern.is_empty() || pattern == "*" {
            return Ok(Self(None));
        }
        Regex::new(pattern)
            .map(|re| Self(Some(re)))
            .map_err(|_| IndirectorError::InvalidKey {
                key: pattern.to_string(),
                reason: "not a valid search pattern",
            })
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.0.as_ref().is_none_or(|re| re.is_match(key))
    }
}

/// Rejects keys that cannot safely name a file under a store root.
///
/// # Errors
///
/// Returns [`IndirectorError::InvalidKey`] for empty keys, path separators,
/// parent references and NUL bytes.
pub fn validate_key(key: &str) -> IndirectorResult<()> {
    let reason = if key.is_empty() {
        "empty key"
    } else if key.contains('/') || key.contains('\\') {
        "contains a path separator"
    } else if key == "." || key.contains("..") {
        "contains a parent reference"
    } else if key.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(IndirectorError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
