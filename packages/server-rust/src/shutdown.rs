//! Process lifecycle shared by the HTTP front end and the queue daemon.
//!
//! Health moves `Starting -> Ready -> Draining -> Stopped`. Work in progress
//! (an HTTP dispatch, a queue handler) holds an [`InFlightGuard`] so drain
//! can wait for it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Process health, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Registry and listeners are still being built.
    Starting,
    /// Accepting requests and queue messages.
    Ready,
    /// Shutdown triggered; in-flight work is finishing.
    Draining,
    /// All in-flight work completed.
    Stopped,
}

impl HealthState {
    /// Lowercase name reported by the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HealthState::Starting => "starting",
            HealthState::Ready => "ready",
            HealthState::Draining => "draining",
            HealthState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the process was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operator cancel (SIGINT / Ctrl-C).
    Interrupt,
    /// Orderly stop (SIGTERM) or a programmatic request.
    Terminate,
}

impl ShutdownReason {
    /// Exit status the process reports for this reason.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            ShutdownReason::Interrupt => 1,
            ShutdownReason::Terminate => 0,
        }
    }
}

/// Health state, shutdown broadcast and in-flight accounting.
#[derive(Debug)]
pub struct ShutdownController {
    signal: watch::Sender<Option<ShutdownReason>>,
    in_flight: Arc<AtomicU64>,
    health: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _rx) = watch::channel(None);
        Self {
            signal,
            in_flight: Arc::new(AtomicU64::new(0)),
            health: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    /// Transitions to `Ready`.
    pub fn set_ready(&self) {
        self.health.store(Arc::new(HealthState::Ready));
    }

    /// Returns the current health state.
    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health.load()
    }

    /// Moves to `Draining` and wakes every waiter. Only the first reason sticks.
    pub fn trigger(&self, reason: ShutdownReason) {
        self.health.store(Arc::new(HealthState::Draining));
        self.signal.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    /// Reason given to [`trigger`](Self::trigger), if shutdown has begun.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.signal.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) -> ShutdownReason {
        let mut rx = self.signal.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return ShutdownReason::Terminate;
            }
        }
    }

    /// Counts one unit of work until the guard drops, panics included.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Returns the number of live [`InFlightGuard`]s.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits up to `timeout` for in-flight work to finish.
    ///
    /// Returns `true` and moves to `Stopped` once drained; `false` on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.in_flight.load(Ordering::Relaxed) == 0 {
                self.health.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Waits for SIGINT or SIGTERM and maps it to a [`ShutdownReason`].
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<ShutdownReason> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok(ShutdownReason::Interrupt),
        _ = terminate.recv() => Ok(ShutdownReason::Terminate),
    }
}

/// Waits for Ctrl-C.
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<ShutdownReason> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownReason::Interrupt)
}
