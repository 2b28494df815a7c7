//! HTTP handlers and the state they share.

pub mod health;
pub mod indirection;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use indirection::{destroy_handler, find_handler, save_handler, search_handler, ApiError};

use std::sync::Arc;
use std::time::Instant;

use crate::indirector::IndirectionRegistry;
use crate::shutdown::ShutdownController;

/// State carried through axum extractors; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Indirections served by the generic handlers.
    pub registry: Arc<IndirectionRegistry>,
    /// Health state and in-flight accounting.
    pub shutdown: Arc<ShutdownController>,
    /// When the server started, for `uptime_secs`.
    pub start_time: Instant,
}
