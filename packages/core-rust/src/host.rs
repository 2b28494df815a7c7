use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::name::IndirectionName;
use crate::ssl::{Certificate, CertificateRequest};

/// Lifecycle state of a host's credentials, derived from what exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    None,
    Requested,
    Signed,
    Revoked,
}

impl HostState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HostState::None => "none",
            HostState::Requested => "requested",
            HostState::Signed => "signed",
            HostState::Revoked => "revoked",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition a client asks the CA to perform on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Signed,
    Revoked,
}

/// Certificate status record for one host.
///
/// Returned by `find`/`search` on the `certificate_status` indirection; a
/// `save` carries the [`DesiredState`] the CA should move the host to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub state: HostState,
    #[serde(default)]
    pub certificate_request: Option<CertificateRequest>,
    #[serde(default)]
    pub certificate: Option<Certificate>,
    /// Fingerprint of the certificate, or of the request when unsigned.
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub desired_state: Option<DesiredState>,
}

impl Host {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: HostState::None,
            certificate_request: None,
            certificate: None,
            fingerprint: None,
            desired_state: None,
        }
    }

    #[must_use]
    pub fn with_desired_state(mut self, desired: DesiredState) -> Self {
        self.desired_state = Some(desired);
        self
    }
}

impl Model for Host {
    const INDIRECTION: IndirectionName = IndirectionName::CERTIFICATE_STATUS;

    fn name(&self) -> &str {
        &self.name
    }
}
