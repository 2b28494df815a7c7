//! Command-line flags of the queue daemon.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{RunMode, Settings};

/// Consumes queued catalogs and writes them to the catalog store.
#[derive(Debug, Clone, Parser)]
#[command(name = "indirector-queue")]
#[command(version)]
#[command(about = "Consume queued catalogs into the store_configs catalog store")]
pub struct Cli {
    /// Log at debug level
    #[arg(long, short = 'd', env = "INDIRECTOR_DEBUG")]
    pub debug: bool,

    /// Log at info level
    #[arg(long, short = 'v', env = "INDIRECTOR_VERBOSE")]
    pub verbose: bool,

    /// Directory holding the SSL store
    #[arg(long, env = "INDIRECTOR_SSLDIR")]
    pub ssldir: Option<PathBuf>,

    /// Root of variable data
    #[arg(long, env = "INDIRECTOR_VARDIR")]
    pub vardir: Option<PathBuf>,

    /// Spool directory of the message broker
    #[arg(long, env = "INDIRECTOR_QUEUE_DIR")]
    pub queue_dir: Option<PathBuf>,

    /// Root of the catalog store
    #[arg(long, env = "INDIRECTOR_STORECONFIGS_DIR")]
    pub storeconfigs_dir: Option<PathBuf>,
}

impl Cli {
    /// Settings for a queue-mode process with the given overrides applied.
    #[must_use]
    pub fn into_settings(self) -> Settings {
        let mut settings = match self.vardir {
            Some(vardir) => Settings::rooted_at(vardir),
            None => Settings::default(),
        };
        settings.run_mode = RunMode::Queue;
        if let Some(ssldir) = self.ssldir {
            settings.ssldir = ssldir;
        }
        settings.queue_dir = self.queue_dir;
        settings.storeconfigs_dir = self.storeconfigs_dir;
        settings
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_paths() {
        let cli = Cli::try_parse_from([
            "indirector-queue",
            "-d",
            "--vardir",
            "/srv/ind",
            "--queue-dir",
            "/spool",
        ])
        .unwrap();
        assert!(cli.debug);
        assert!(!cli.verbose);

        let settings = cli.into_settings();
        assert_eq!(settings.run_mode, RunMode::Queue);
        assert_eq!(settings.ssldir, PathBuf::from("/srv/ind/ssl"));
        assert_eq!(settings.queue_dir(), PathBuf::from("/spool"));
        assert_eq!(
            settings.storeconfigs_dir(),
            PathBuf::from("/srv/ind/storeconfigs")
        );
    }

    #[test]
    fn explicit_ssldir_wins() {
        let cli = Cli::try_parse_from(["indirector-queue", "--ssldir", "/etc/ssl/ind"]).unwrap();
        assert_eq!(cli.into_settings().ssldir, PathBuf::from("/etc/ssl/ind"));
    }
}
