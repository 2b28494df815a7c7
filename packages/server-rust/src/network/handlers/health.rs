//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::shutdown::HealthState;

/// Returns lifecycle state, in-flight count and the configured termini as JSON.
///
/// Always 200; the `state` field tells whether the server is serving or
/// draining.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let indirections: serde_json::Map<String, serde_json::Value> = state
        .registry
        .names()
        .into_iter()
        .filter_map(|name| {
            state.registry.describe(name.as_str()).map(|(terminus, cache)| {
                (
                    name.to_string(),
                    json!({ "terminus": terminus, "cache": cache }),
                )
            })
        })
        .collect();

    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "indirections": indirections,
    }))
}

/// Liveness check: 200 while the process answers at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: 200 once ready, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
