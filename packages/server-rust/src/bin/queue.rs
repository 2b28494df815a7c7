//! `indirector-queue`: consumes queued catalogs into the catalog store.
//!
//! SIGINT exits with status 1, SIGTERM with status 0.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indirector_server::bootstrap::{self, Collaborators};
use indirector_server::cli::Cli;
use indirector_server::daemon::QueueDaemon;
use indirector_server::indirector::TerminusContext;
use indirector_server::shutdown::{wait_for_signal, ShutdownController};
use indirector_server::telemetry;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = telemetry::init_logging(cli.debug, cli.verbose) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %format!("{err:#}"), "queue daemon failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let settings = cli.into_settings();
    info!(
        queue_dir = %settings.queue_dir().display(),
        storeconfigs_dir = %settings.storeconfigs_dir().display(),
        "starting queue daemon"
    );

    let collaborators = Collaborators::for_settings(&settings);
    let registry = bootstrap::build_registry(TerminusContext::new(settings), &collaborators)
        .context("configuring indirections")?;
    let daemon = QueueDaemon::new(&registry, Arc::clone(&collaborators.broker))
        .context("starting queue consumer")?;

    let controller = Arc::new(ShutdownController::new());
    let signals = Arc::clone(&controller);
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(reason) => signals.trigger(reason),
            Err(err) => error!(error = %err, "cannot install signal handlers"),
        }
    });

    let reason = daemon.run(&controller).await;
    info!(?reason, "queue daemon stopped");
    Ok(u8::try_from(reason.exit_code()).unwrap_or(1))
}
