//! Logging setup and timing helpers.

use std::future::Future;
use std::time::Instant;

use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting the log output (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "INDIRECTOR_LOG_FORMAT";

/// Level implied by the `--debug` / `--verbose` flags.
#[must_use]
pub fn level_for(debug: bool, verbose: bool) -> Level {
    if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the flag-derived level.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(debug: bool, verbose: bool) -> anyhow::Result<()> {
    let level = level_for(debug, verbose);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tower_http=warn")));

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }
    Ok(())
}

/// Awaits `fut` and logs how long it took under `label`.
pub async fn benchmark<F, T>(label: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    let output = fut.await;
    info!(
        operation = label,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "finished"
    );
    output
}
