//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (ready to serve traffic)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;
use crate::store::BackendStats;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Kubernetes readiness probe.
/// Ready once the primary store answers a count.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    let stats = state.store.stats().await;
    if primary_ok(&stats) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with per-backend counters. Remote backends are not
/// probed here; their failures show up on reads and in the logs.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.store.stats().await;
    let store_ok = primary_ok(&stats);
    let local_failures = stats
        .iter()
        .filter(|s| !s.remote && s.events.is_none())
        .count();

    let status = if !store_ok {
        "unhealthy"
    } else if local_failures > 0 {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        store: if store_ok { "ok" } else { "error" }.to_string(),
        backends: stats,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// The first entry is always the primary
fn primary_ok(stats: &[BackendStats]) -> bool {
    stats
        .first()
        .map(|primary| primary.remote || primary.events.is_some())
        .unwrap_or(false)
}
