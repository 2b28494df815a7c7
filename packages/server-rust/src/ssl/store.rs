//! On-disk layout of SSL artifacts under `ssldir`.
//!
//! ```text
//! ca/ca_key.pem  ca/ca_crt.pem  ca/ca_crl.pem  ca/serial  ca/inventory.txt
//! certs/<host>.pem  requests/<host>.pem  private_keys/<host>.pem
//! ```
//!
//! The store is not locked against other processes sharing the directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indirector_core::ssl::{
    Certificate, CertificateRequest, CertificateRevocationList, PrivateKey,
};
use tokio::io::AsyncWriteExt;

use crate::error::{IndirectorError, IndirectorResult};
use crate::fsutil;
use crate::termini::validate_key;

const PEM: &str = "pem";

/// Paths and IO for every SSL artifact.
#[derive(Debug, Clone)]
pub struct SslStore {
    root: PathBuf,
}

impl SslStore {
    #[must_use]
    pub fn new(ssldir: impl Into<PathBuf>) -> Self {
        Self {
            root: ssldir.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn ca_dir(&self) -> PathBuf {
        self.root.join("ca")
    }

    #[must_use]
    pub fn ca_key_path(&self) -> PathBuf {
        self.ca_dir().join("ca_key.pem")
    }

    #[must_use]
    pub fn ca_cert_path(&self) -> PathBuf {
        self.ca_dir().join("ca_crt.pem")
    }

    #[must_use]
    pub fn crl_path(&self) -> PathBuf {
        self.ca_dir().join("ca_crl.pem")
    }

    #[must_use]
    pub fn serial_path(&self) -> PathBuf {
        self.ca_dir().join("serial")
    }

    #[must_use]
    pub fn inventory_path(&self) -> PathBuf {
        self.ca_dir().join("inventory.txt")
    }

    fn certs_dir(&self) -> PathBuf {
        self.root.join("certs")
    }

    fn requests_dir(&self) -> PathBuf {
        self.root.join("requests")
    }

    /// # Errors
    ///
    /// Returns [`IndirectorError::InvalidKey`] for host names unusable as file names.
    pub fn certificate_path(&self, host: &str) -> IndirectorResult<PathBuf> {
        validate_key(host)?;
        Ok(self.certs_dir().join(format!("{host}.{PEM}")))
    }

    /// # Errors
    ///
    /// Returns [`IndirectorError::InvalidKey`] for host names unusable as file names.
    pub fn request_path(&self, host: &str) -> IndirectorResult<PathBuf> {
        validate_key(host)?;
        Ok(self.requests_dir().join(format!("{host}.{PEM}")))
    }

    /// # Errors
    ///
    /// Returns [`IndirectorError::InvalidKey`] for host names unusable as file names.
    pub fn private_key_path(&self, host: &str) -> IndirectorResult<PathBuf> {
        validate_key(host)?;
        Ok(self.root.join("private_keys").join(format!("{host}.{PEM}")))
    }

    // -----------------------------------------------------------------------
    // CA artifacts
    // -----------------------------------------------------------------------

    pub(crate) async fn read_ca_key(&self) -> IndirectorResult<Option<PrivateKey>> {
        read_pem(&self.ca_key_path(), PrivateKey::from_pem).await
    }

    pub(crate) async fn write_ca_key(&self, key: &PrivateKey) -> IndirectorResult<()> {
        write_text(&self.ca_key_path(), &key.to_pem()).await
    }

    pub(crate) async fn read_ca_certificate(&self) -> IndirectorResult<Option<Certificate>> {
        read_pem(&self.ca_cert_path(), Certificate::from_pem).await
    }

    pub(crate) async fn write_ca_certificate(&self, cert: &Certificate) -> IndirectorResult<()> {
        write_text(&self.ca_cert_path(), cert.pem()).await
    }

    pub(crate) async fn read_crl(&self) -> IndirectorResult<Option<CertificateRevocationList>> {
        read_pem(&self.crl_path(), CertificateRevocationList::from_pem).await
    }

    pub(crate) async fn write_crl(&self, crl: &CertificateRevocationList) -> IndirectorResult<()> {
        write_text(&self.crl_path(), crl.pem()).await
    }

    /// Returns the next serial and advances the counter.
    ///
    /// The counter is a hex number; a missing file starts at 1.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] for a corrupt or exhausted
    /// counter.
    pub(crate) async fn next_serial(&self) -> IndirectorResult<u64> {
        let path = self.serial_path();
        let serial = match fsutil::read_optional(&path).await? {
            Some(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                u64::from_str_radix(text.trim(), 16).map_err(|e| {
                    IndirectorError::configuration(format!(
                        "corrupt serial file {}: {e}",
                        path.display()
                    ))
                })?
            }
            None => 1,
        };
        let next = serial
            .checked_add(1)
            .ok_or_else(|| IndirectorError::configuration("serial space exhausted"))?;
        write_text(&path, &format!("{next:04X}\n")).await?;
        Ok(serial)
    }

    /// Appends one line per issued certificate to the inventory.
    pub(crate) async fn append_inventory(&self, cert: &Certificate) -> IndirectorResult<()> {
        let path = self.inventory_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let validity = cert.validity();
        let line = format!(
            "0x{:04x} {} {} /CN={}\n",
            cert.serial(),
            validity.not_before,
            validity.not_after,
            cert.subject()
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Host artifacts
    // -----------------------------------------------------------------------

    pub(crate) async fn read_certificate(&self, host: &str) -> IndirectorResult<Option<Certificate>> {
        read_pem(&self.certificate_path(host)?, Certificate::from_pem).await
    }

    pub(crate) async fn write_certificate(&self, cert: &Certificate) -> IndirectorResult<()> {
        write_text(&self.certificate_path(cert.subject())?, cert.pem()).await
    }

    pub(crate) async fn read_request(
        &self,
        host: &str,
    ) -> IndirectorResult<Option<CertificateRequest>> {
        read_pem(&self.request_path(host)?, CertificateRequest::from_pem).await
    }

    pub(crate) async fn write_request(&self, csr: &CertificateRequest) -> IndirectorResult<()> {
        write_text(&self.request_path(csr.subject())?, csr.pem()).await
    }

    pub(crate) async fn write_private_key(
        &self,
        host: &str,
        key: &PrivateKey,
    ) -> IndirectorResult<()> {
        write_text(&self.private_key_path(host)?, &key.to_pem()).await
    }

    pub(crate) async fn remove_request(&self, host: &str) -> IndirectorResult<bool> {
        Ok(fsutil::remove_if_exists(&self.request_path(host)?).await?)
    }

    pub(crate) async fn remove_certificate(&self, host: &str) -> IndirectorResult<bool> {
        Ok(fsutil::remove_if_exists(&self.certificate_path(host)?).await?)
    }

    pub(crate) async fn remove_private_key(&self, host: &str) -> IndirectorResult<bool> {
        Ok(fsutil::remove_if_exists(&self.private_key_path(host)?).await?)
    }

    /// Every host with a request or a certificate on disk, sorted.
    pub(crate) async fn hosts(&self) -> IndirectorResult<Vec<String>> {
        let mut hosts: BTreeSet<String> = fsutil::list_stems(&self.certs_dir(), PEM)
            .await?
            .into_iter()
            .collect();
        hosts.extend(fsutil::list_stems(&self.requests_dir(), PEM).await?);
        Ok(hosts.into_iter().collect())
    }
}

async fn read_pem<T, F>(path: &Path, parse: F) -> IndirectorResult<Option<T>>
where
    F: FnOnce(&str) -> Result<T, indirector_core::SslError>,
{
    match fsutil::read_optional(path).await? {
        Some(bytes) => Ok(Some(parse(&String::from_utf8_lossy(&bytes))?)),
        None => Ok(None),
    }
}

async fn write_text(path: &Path, text: &str) -> IndirectorResult<()> {
    Ok(fsutil::atomic_write(path, text.as_bytes()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let store = SslStore::new("/ssl");
        assert_eq!(store.ca_key_path(), PathBuf::from("/ssl/ca/ca_key.pem"));
        assert_eq!(store.ca_cert_path(), PathBuf::from("/ssl/ca/ca_crt.pem"));
        assert_eq!(store.crl_path(), PathBuf::from("/ssl/ca/ca_crl.pem"));
        assert_eq!(
            store.certificate_path("web01").unwrap(),
            PathBuf::from("/ssl/certs/web01.pem")
        );
        assert_eq!(
            store.request_path("web01").unwrap(),
            PathBuf::from("/ssl/requests/web01.pem")
        );
        assert_eq!(
            store.private_key_path("web01").unwrap(),
            PathBuf::from("/ssl/private_keys/web01.pem")
        );
        assert!(store.certificate_path("../ca/ca_key").is_err());
    }

    #[tokio::test]
    async fn serial_counter_advances() {
        let dir = tempfile::tempdir().unwrap();
        let store = SslStore::new(dir.path());
        assert_eq!(store.next_serial().await.unwrap(), 1);
        assert_eq!(store.next_serial().await.unwrap(), 2);
        let text = std::fs::read_to_string(store.serial_path()).unwrap();
        assert_eq!(text.trim(), "0003");
    }

    #[tokio::test]
    async fn exhausted_serial_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SslStore::new(dir.path());
        std::fs::create_dir_all(store.ca_dir()).unwrap();
        std::fs::write(store.serial_path(), "FFFFFFFFFFFFFFFF\n").unwrap();
        let err = store.next_serial().await.unwrap_err();
        assert!(matches!(err, IndirectorError::Configuration(ref m) if m.contains("exhausted")));
        let text = std::fs::read_to_string(store.serial_path()).unwrap();
        assert_eq!(text.trim(), "FFFFFFFFFFFFFFFF");
    }

    #[tokio::test]
    async fn corrupt_serial_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SslStore::new(dir.path());
        std::fs::create_dir_all(store.ca_dir()).unwrap();
        std::fs::write(store.serial_path(), "not hex").unwrap();
        assert!(matches!(
            store.next_serial().await,
            Err(IndirectorError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn hosts_union_requests_and_certs() {
        let dir = tempfile::tempdir().unwrap();
        let store = SslStore::new(dir.path());
        let key = PrivateKey::generate().unwrap();
        store
            .write_request(&CertificateRequest::generate("b", &key).unwrap())
            .await
            .unwrap();
        store
            .write_request(&CertificateRequest::generate("a", &key).unwrap())
            .await
            .unwrap();
        assert_eq!(store.hosts().await.unwrap(), vec!["a", "b"]);
        assert!(store.read_certificate("a").await.unwrap().is_none());
    }
}
