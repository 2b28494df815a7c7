use std::sync::Arc;

use async_trait::async_trait;
use indirector_core::{ClockSource, DesiredState, Host, Request};
use tokio::sync::OnceCell;

use crate::config::Settings;
use crate::error::{IndirectorError, IndirectorResult};
use crate::indirector::{Terminus, TerminusContext};
use crate::ssl::CertificateAuthority;

/// `file` terminus of the certificate status indirection, backed by the CA.
///
/// The authority is created (and set up) on first use, and only in a process
/// configured as a CA.
pub struct CertificateStatusTerminus {
    settings: Arc<Settings>,
    clock: Arc<dyn ClockSource>,
    authority: OnceCell<Arc<CertificateAuthority>>,
}

impl CertificateStatusTerminus {
    #[must_use]
    pub fn new(ctx: &TerminusContext) -> Self {
        Self {
            settings: Arc::clone(&ctx.settings),
            clock: Arc::clone(&ctx.clock),
            authority: OnceCell::new(),
        }
    }

    /// The process's certificate authority.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] when this process is not a
    /// CA or the CA cannot be set up.
    pub async fn authority(&self) -> IndirectorResult<&Arc<CertificateAuthority>> {
        self.authority
            .get_or_try_init(|| async {
                if !self.settings.ca {
                    return Err(IndirectorError::configuration(format!(
                        "{} is not a certificate authority",
                        self.settings.certname
                    )));
                }
                let authority =
                    CertificateAuthority::new(&self.settings, Arc::clone(&self.clock));
                authority.setup().await?;
                Ok(Arc::new(authority))
            })
            .await
    }
}

#[async_trait]
impl Terminus<Host> for CertificateStatusTerminus {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn find(&self, request: &Request<Host>) -> IndirectorResult<Option<Host>> {
        self.authority().await?.find(request.key()).await
    }

    async fn search(&self, request: &Request<Host>) -> IndirectorResult<Vec<Host>> {
        self.authority().await?.search(request.key()).await
    }

    /// Applies the record's desired state. A record without one but carrying
    /// a certificate request submits that request.
    async fn save(&self, request: &Request<Host>) -> IndirectorResult<()> {
        let authority = self.authority().await?;
        let host = request.key();
        let instance = request.instance();
        match instance.and_then(|h| h.desired_state) {
            Some(DesiredState::Signed) => {
                require_authenticated(request, "sign certificates")?;
                authority.sign(host).await.map(|_| ())
            }
            Some(DesiredState::Revoked) => {
                require_authenticated(request, "revoke certificates")?;
                authority.revoke(host).await
            }
            None => match instance.and_then(|h| h.certificate_request.as_ref()) {
                Some(csr) if csr.subject() == host => authority.submit_request(csr).await,
                Some(csr) => Err(IndirectorError::state(format!(
                    "certificate request for {} cannot be saved as {host}",
                    csr.subject()
                ))),
                None => Err(IndirectorError::state(format!(
                    "unknown desired state for {host}; expected signed or revoked"
                ))),
            },
        }
    }

    async fn destroy(&self, request: &Request<Host>) -> IndirectorResult<()> {
        require_authenticated(request, "destroy host credentials")?;
        self.authority().await?.destroy(request.key()).await
    }
}

/// Sign, revoke and destroy need a verified client certificate when the
/// request came over the network. Requests without a requester are
/// in-process and trusted; anonymous clients may still submit requests.
fn require_authenticated(request: &Request<Host>, action: &str) -> IndirectorResult<()> {
    match request.requester() {
        Some(principal) if !principal.authenticated => Err(IndirectorError::Forbidden {
            requester: principal.id.clone(),
            action: action.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use indirector_core::ssl::{CertificateRequest, PrivateKey};
    use indirector_core::{HostState, Principal};

    use super::*;

    fn terminus(dir: &std::path::Path, ca: bool) -> CertificateStatusTerminus {
        let settings = Settings {
            ca,
            ..Settings::rooted_at(dir)
        };
        CertificateStatusTerminus::new(&TerminusContext::new(settings))
    }

    #[tokio::test]
    async fn non_ca_process_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), false);
        let err = status
            .save(&Request::save(Host::new("web01").with_desired_state(DesiredState::Signed)))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Configuration(_)));
        assert!(!dir.path().join("ssl/ca").exists());
    }

    #[tokio::test]
    async fn find_is_nil_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), true);
        assert!(status.find(&Request::find("web01")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_submits_then_signs() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), true);
        let key = PrivateKey::generate().unwrap();
        let mut record = Host::new("web01");
        record.certificate_request = Some(CertificateRequest::generate("web01", &key).unwrap());
        status.save(&Request::save(record)).await.unwrap();
        let found = status.find(&Request::find("web01")).await.unwrap().unwrap();
        assert_eq!(found.state, HostState::Requested);

        status
            .save(&Request::save(Host::new("web01").with_desired_state(DesiredState::Signed)))
            .await
            .unwrap();
        let found = status.find(&Request::find("web01")).await.unwrap().unwrap();
        assert_eq!(found.state, HostState::Signed);
    }

    #[tokio::test]
    async fn submission_is_refused_when_ca_key_was_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), true);
        let authority = status.authority().await.unwrap();
        authority
            .store()
            .write_ca_key(&PrivateKey::generate().unwrap())
            .await
            .unwrap();

        let key = PrivateKey::generate().unwrap();
        let mut record = Host::new("web01");
        record.certificate_request = Some(CertificateRequest::generate("web01", &key).unwrap());
        let err = status.save(&Request::save(record)).await.unwrap_err();
        assert!(matches!(err, IndirectorError::Configuration(_)), "unexpected error: {err}");
        assert!(status.find(&Request::find("web01")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn anonymous_clients_may_submit_but_not_sign() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), true);
        let key = PrivateKey::generate().unwrap();
        let mut record = Host::new("web01");
        record.certificate_request = Some(CertificateRequest::generate("web01", &key).unwrap());
        status
            .save(&Request::save(record).with_requester(Principal::anonymous("web01")))
            .await
            .unwrap();

        let sign = Request::save(Host::new("web01").with_desired_state(DesiredState::Signed));
        let err = status
            .save(&sign.clone().with_requester(Principal::anonymous("web01")))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Forbidden { ref requester, .. } if requester == "web01"));
        let err = status
            .destroy(&Request::destroy("web01").with_requester(Principal::anonymous("web01")))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Forbidden { .. }));
        let found = status.find(&Request::find("web01")).await.unwrap().unwrap();
        assert_eq!(found.state, HostState::Requested);

        status
            .save(&sign.with_requester(Principal::authenticated("ca.example.com")))
            .await
            .unwrap();
        let found = status.find(&Request::find("web01")).await.unwrap().unwrap();
        assert_eq!(found.state, HostState::Signed);
    }

    #[tokio::test]
    async fn missing_desired_state_is_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), true);
        let err = status.save(&Request::save(Host::new("web01"))).await.unwrap_err();
        assert!(matches!(err, IndirectorError::State(ref m) if m.contains("unknown desired state")));
    }

    #[tokio::test]
    async fn sign_without_request_fails() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), true);
        let err = status
            .save(&Request::save(Host::new("ghost").with_desired_state(DesiredState::Signed)))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::State(ref m) if m.contains("no certificate request")));
    }

    #[tokio::test]
    async fn destroy_with_nothing_on_disk_fails() {
        let dir = tempfile::tempdir().unwrap();
        let status = terminus(dir.path(), true);
        let err = status.destroy(&Request::destroy("ghost")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::State(_)));
    }
}
