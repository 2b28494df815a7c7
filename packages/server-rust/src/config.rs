use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use indirector_core::Format;

/// Process role; selects the default terminus for each indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Fetches catalogs from a master over REST.
    Agent,
    /// Serves indirections over HTTP and acts as the CA.
    Master,
    /// Consumes queued catalogs into the store.
    Queue,
    /// Compiles and applies locally without a master.
    Apply,
}

impl RunMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RunMode::Agent => "agent",
            RunMode::Master => "master",
            RunMode::Queue => "queue",
            RunMode::Apply => "apply",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-level settings shared by every terminus constructor.
///
/// Paths default to locations under `vardir`/`ssldir`; the accessor methods
/// resolve them so an explicit override wins.
#[derive(Debug, Clone)]
pub struct Settings {
    pub run_mode: RunMode,
    /// Name this process identifies as (certificate subject).
    pub certname: String,
    /// Master host the REST termini talk to.
    pub server: String,
    pub masterport: u16,
    /// `http` or `https`.
    pub scheme: String,
    /// Bound on REST round trips. `None` keeps the transport default.
    pub http_timeout: Option<Duration>,
    pub vardir: PathBuf,
    pub ssldir: PathBuf,
    /// Root of the flat-file termini; defaults to `vardir/yaml`.
    pub yamldir: Option<PathBuf>,
    /// Root of the catalog store fed by the queue; defaults to `vardir/storeconfigs`.
    pub storeconfigs_dir: Option<PathBuf>,
    /// Spool directory of the directory broker; defaults to `vardir/queue`.
    pub queue_dir: Option<PathBuf>,
    /// Whether this process is the certificate authority.
    pub ca: bool,
    /// Subject of the CA certificate.
    pub ca_name: String,
    /// Validity of issued certificates.
    pub ca_ttl: Duration,
    /// Generate the CA key and certificate when they are missing.
    pub ca_autosetup: bool,
    /// Lowercase every fact value after gathering.
    pub downcase_facts: bool,
    /// Format used by file and queue termini.
    pub preferred_format: Format,
}

impl Default for Settings {
    fn default() -> Self {
        let vardir = PathBuf::from("/var/lib/indirector");
        Self {
            run_mode: RunMode::Agent,
            certname: "localhost".to_string(),
            server: "puppet".to_string(),
            masterport: 8140,
            scheme: "https".to_string(),
            http_timeout: None,
            ssldir: vardir.join("ssl"),
            vardir,
            yamldir: None,
            storeconfigs_dir: None,
            queue_dir: None,
            ca: false,
            ca_name: "Indirector CA".to_string(),
            ca_ttl: Duration::from_secs(5 * 365 * 24 * 60 * 60),
            ca_autosetup: true,
            downcase_facts: false,
            preferred_format: Format::Json,
        }
    }
}

impl Settings {
    /// Settings rooted at `dir` for every path; handy for tests and sandboxes.
    #[must_use]
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let vardir = dir.into();
        Self {
            ssldir: vardir.join("ssl"),
            vardir,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn yamldir(&self) -> PathBuf {
        self.yamldir
            .clone()
            .unwrap_or_else(|| self.vardir.join("yaml"))
    }

    #[must_use]
    pub fn storeconfigs_dir(&self) -> PathBuf {
        self.storeconfigs_dir
            .clone()
            .unwrap_or_else(|| self.vardir.join("storeconfigs"))
    }

    #[must_use]
    pub fn queue_dir(&self) -> PathBuf {
        self.queue_dir
            .clone()
            .unwrap_or_else(|| self.vardir.join("queue"))
    }

    /// Base URL of the master, e.g. `https://puppet:8140`.
    #[must_use]
    pub fn master_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.server, self.masterport)
    }
}
