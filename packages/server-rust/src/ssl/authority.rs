//! The certificate authority: request, sign, revoke.
//!
//! Host state is never stored; it is derived from which artifacts exist:
//! a certificate means `signed` (or `revoked` when its serial is on the
//! CRL), a request without a certificate means `requested`.

use std::sync::Arc;
use std::time::Duration;

use indirector_core::ssl::{
    Certificate, CertificateRequest, CertificateRevocationList, PrivateKey, Validity,
};
use indirector_core::{ClockSource, Host, HostState};
use tokio::sync::Mutex;
use tracing::info;

use super::store::SslStore;
use crate::config::Settings;
use crate::error::{IndirectorError, IndirectorResult};
use crate::termini::KeyPattern;

/// Certificate authority over an [`SslStore`].
///
/// Mutations are serialized within the process; the directory itself is not
/// locked against other processes.
pub struct CertificateAuthority {
    store: SslStore,
    name: String,
    ttl: Duration,
    autosetup: bool,
    clock: Arc<dyn ClockSource>,
    mutation: Mutex<()>,
}

impl CertificateAuthority {
    #[must_use]
    pub fn new(settings: &Settings, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            store: SslStore::new(&settings.ssldir),
            name: settings.ca_name.clone(),
            ttl: settings.ca_ttl,
            autosetup: settings.ca_autosetup,
            clock,
            mutation: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SslStore {
        &self.store
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> i64 {
        i64::try_from(self.clock.now() / 1000).unwrap_or(i64::MAX)
    }

    /// Validity of anything issued now.
    fn window(&self) -> Validity {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        Validity::starting_at(self.now(), ttl)
    }

    // -----------------------------------------------------------------------
    // CA identity
    // -----------------------------------------------------------------------

    /// Creates the CA key, self-signed certificate and empty CRL when the key
    /// or certificate is missing and autosetup is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] when the CA is incomplete
    /// and autosetup is disabled, or IO errors from the store.
    pub async fn setup(&self) -> IndirectorResult<()> {
        let _guard = self.mutation.lock().await;
        let key = self.store.read_ca_key().await?;
        let cert = self.store.read_ca_certificate().await?;
        if key.is_some() && cert.is_some() {
            return Ok(());
        }
        if !self.autosetup {
            return Err(IndirectorError::configuration(format!(
                "certificate authority under {} is incomplete and autosetup is disabled",
                self.store.root().display()
            )));
        }

        let window = self.window();
        let key = PrivateKey::generate()?;
        let serial = self.store.next_serial().await?;
        let cert = Certificate::self_signed_authority(&self.name, &key, serial, window)?;
        self.store.write_ca_key(&key).await?;
        self.store.write_ca_certificate(&cert).await?;
        self.store.append_inventory(&cert).await?;
        self.store
            .write_crl(&CertificateRevocationList::issue(&cert, &key, Vec::new(), window)?)
            .await?;
        info!(ca = %self.name, serial, fingerprint = %cert.fingerprint(), "generated certificate authority");
        Ok(())
    }

    /// Loads the CA key and certificate and checks they belong together.
    ///
    /// Every mutation calls this under the mutation lock before touching the
    /// store.
    async fn identity(&self) -> IndirectorResult<(PrivateKey, Certificate)> {
        let key = self.store.read_ca_key().await?;
        let cert = self.store.read_ca_certificate().await?;
        let (Some(key), Some(cert)) = (key, cert) else {
            return Err(IndirectorError::configuration(format!(
                "no certificate authority key and certificate under {}",
                self.store.root().display()
            )));
        };
        if !cert.matches_key(&key) {
            return Err(IndirectorError::configuration(
                "certificate authority key does not match its certificate",
            ));
        }
        if !cert.is_ca() {
            return Err(IndirectorError::configuration(format!(
                "{} is not a CA certificate",
                cert.subject()
            )));
        }
        Ok((key, cert))
    }

    async fn crl(
        &self,
        key: &PrivateKey,
        authority: &Certificate,
    ) -> IndirectorResult<CertificateRevocationList> {
        match self.store.read_crl().await? {
            Some(crl) => Ok(crl),
            None => Ok(CertificateRevocationList::issue(
                authority,
                key,
                Vec::new(),
                self.window(),
            )?),
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Generates a key pair and certificate request for `host` and stores both.
    ///
    /// # Errors
    ///
    /// [`IndirectorError::Configuration`] when the CA identity is unusable;
    /// [`IndirectorError::InvalidKey`] for unusable host names; store errors.
    pub async fn generate_request(&self, host: &str) -> IndirectorResult<CertificateRequest> {
        self.store.certificate_path(host)?;
        let _guard = self.mutation.lock().await;
        self.identity().await?;
        let key = PrivateKey::generate()?;
        let csr = CertificateRequest::generate(host, &key)?;
        self.store.write_private_key(host, &key).await?;
        self.store.write_request(&csr).await?;
        info!(host, fingerprint = %csr.fingerprint(), "generated certificate request");
        Ok(csr)
    }

    /// Stores a request produced elsewhere after checking its self-signature.
    ///
    /// # Errors
    ///
    /// [`IndirectorError::Configuration`] when the CA identity is unusable;
    /// [`IndirectorError::Ssl`] for a forged request.
    pub async fn submit_request(&self, csr: &CertificateRequest) -> IndirectorResult<()> {
        csr.verify()?;
        let _guard = self.mutation.lock().await;
        self.identity().await?;
        self.store.write_request(csr).await?;
        info!(host = csr.subject(), fingerprint = %csr.fingerprint(), "accepted certificate request");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Signs the pending request of `host`.
    ///
    /// # Errors
    ///
    /// [`IndirectorError::Configuration`] when the CA identity is unusable;
    /// [`IndirectorError::State`] without a pending request or when the
    /// host is revoked; [`IndirectorError::Ssl`] for a forged request.
    pub async fn sign(&self, host: &str) -> IndirectorResult<Certificate> {
        let _guard = self.mutation.lock().await;
        let (key, ca_cert) = self.identity().await?;
        let Some(csr) = self.store.read_request(host).await? else {
            return Err(IndirectorError::state(format!(
                "no certificate request to sign for {host}"
            )));
        };
        if let Some(existing) = self.store.read_certificate(host).await? {
            if self.crl(&key, &ca_cert).await?.is_revoked(existing.serial()) {
                return Err(IndirectorError::state(format!(
                    "{host} has a revoked certificate; remove it before signing again"
                )));
            }
        }
        csr.verify()?;
        if csr.subject() != host {
            return Err(IndirectorError::state(format!(
                "certificate request for {} cannot be signed as {host}",
                csr.subject()
            )));
        }

        let serial = self.store.next_serial().await?;
        let cert = Certificate::issue(&csr, &ca_cert, &key, serial, self.window())?;
        self.store.write_certificate(&cert).await?;
        self.store.append_inventory(&cert).await?;
        self.store.remove_request(host).await?;
        info!(host, serial, "signed certificate");
        Ok(cert)
    }

    /// Adds the certificate of `host` to the CRL.
    ///
    /// # Errors
    ///
    /// [`IndirectorError::Configuration`] when the CA identity is unusable;
    /// [`IndirectorError::State`] without a certificate or when already revoked.
    pub async fn revoke(&self, host: &str) -> IndirectorResult<()> {
        let _guard = self.mutation.lock().await;
        let (key, ca_cert) = self.identity().await?;
        let Some(cert) = self.store.read_certificate(host).await? else {
            return Err(IndirectorError::state(format!(
                "cannot revoke; no certificate for {host}"
            )));
        };
        let crl = self.crl(&key, &ca_cert).await?;
        if crl.is_revoked(cert.serial()) {
            return Err(IndirectorError::state(format!(
                "certificate for {host} is already revoked"
            )));
        }
        let crl = crl.revoke(&cert, &ca_cert, &key, self.window())?;
        self.store.write_crl(&crl).await?;
        info!(host, serial = cert.serial(), "revoked certificate");
        Ok(())
    }

    /// Removes the request, certificate and private key of `host`.
    ///
    /// # Errors
    ///
    /// [`IndirectorError::Configuration`] when the CA identity is unusable;
    /// [`IndirectorError::State`] when none of the three exist.
    pub async fn destroy(&self, host: &str) -> IndirectorResult<()> {
        let _guard = self.mutation.lock().await;
        self.identity().await?;
        let request = self.store.remove_request(host).await?;
        let certificate = self.store.remove_certificate(host).await?;
        let private_key = self.store.remove_private_key(host).await?;
        if !(request || certificate || private_key) {
            return Err(IndirectorError::state(format!(
                "nothing was deleted for {host}"
            )));
        }
        info!(host, request, certificate, private_key, "destroyed host credentials");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Status record for `host`; `None` when it has neither request nor certificate.
    ///
    /// # Errors
    ///
    /// Returns store or parse errors.
    pub async fn find(&self, host: &str) -> IndirectorResult<Option<Host>> {
        let csr = self.store.read_request(host).await?;
        let cert = self.store.read_certificate(host).await?;
        let revoked = match &cert {
            Some(cert) => self
                .store
                .read_crl()
                .await?
                .is_some_and(|crl| crl.is_revoked(cert.serial())),
            None => false,
        };
        let state = match (&csr, &cert) {
            (_, Some(_)) if revoked => HostState::Revoked,
            (_, Some(_)) => HostState::Signed,
            (Some(_), None) => HostState::Requested,
            (None, None) => return Ok(None),
        };
        let fingerprint = match (&cert, &csr) {
            (Some(cert), _) => Some(cert.fingerprint()),
            (None, Some(csr)) => Some(csr.fingerprint()),
            (None, None) => None,
        };
        Ok(Some(Host {
            name: host.to_string(),
            state,
            certificate_request: csr,
            certificate: cert,
            fingerprint,
            desired_state: None,
        }))
    }

    /// Status records of every known host whose name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns pattern, store or parse errors.
    pub async fn search(&self, pattern: &str) -> IndirectorResult<Vec<Host>> {
        let pattern = KeyPattern::parse(pattern)?;
        let mut hosts = Vec::new();
        for name in self.store.hosts().await? {
            if !pattern.matches(&name) {
                continue;
            }
            if let Some(host) = self.find(&name).await? {
                hosts.push(host);
            }
        }
        Ok(hosts)
    }

    /// Checks the certificate of `host` against the CA: signature, validity
    /// window and revocation.
    ///
    /// # Errors
    ///
    /// [`IndirectorError::State`] without a certificate;
    /// [`IndirectorError::Ssl`] when verification fails, including
    /// [`SslError::Revoked`](indirector_core::SslError::Revoked).
    pub async fn verify(&self, host: &str) -> IndirectorResult<Certificate> {
        let (_, ca_cert) = self.identity().await?;
        let Some(cert) = self.store.read_certificate(host).await? else {
            return Err(IndirectorError::state(format!("no certificate for {host}")));
        };
        cert.verify(&ca_cert, self.now())?;
        if let Some(crl) = self.store.read_crl().await? {
            crl.check(&cert)?;
        }
        Ok(cert)
    }
}
