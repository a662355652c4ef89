//! Dashboard Routes
//!
//! - GET /api/v1/dashboard - Aggregated snapshot and advanced metrics

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::analytics::{compute_advanced, compute_dashboard};
use crate::api::auth::DashboardAccess;
use crate::api::dto::{DashboardParams, DashboardResponse};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::events::{parse_range, preset, DateRange};

/// Preset used when the request names no window
pub const DEFAULT_PRESET: &str = "7d";

/// GET /api/v1/dashboard
///
/// Explicit `start`/`end` bounds win over `range`; with neither the last
/// seven days are shown.
pub async fn get_dashboard(
    _access: DashboardAccess,
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardParams>,
) -> ApiResult<Json<DashboardResponse>> {
    let now = state.now();
    let range = resolve_window(&state, &params, now)?;

    let outcome = state.store.fetch(Some(range)).await;
    let options = state.aggregate_options().with_range(Some(range));

    let snapshot = compute_dashboard(&outcome.events, &state.catalog, &options);
    let advanced = compute_advanced(&outcome.events, &state.catalog, &options);

    tracing::info!(
        start = range.start,
        end = range.end,
        events = snapshot.total_events,
        sessions = snapshot.total_sessions,
        source = ?outcome.source,
        "Dashboard computed"
    );

    Ok(Json(DashboardResponse {
        range: range.into(),
        source: outcome.source,
        generated_at: now,
        snapshot,
        advanced,
        warnings: outcome.failures,
    }))
}

fn resolve_window(state: &AppState, params: &DashboardParams, now: i64) -> ApiResult<DateRange> {
    let explicit = parse_range(params.start.as_deref(), params.end.as_deref(), now, state.zone)?;
    if let Some(range) = explicit {
        return Ok(range);
    }

    let name = params
        .range
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(DEFAULT_PRESET);
    Ok(preset(name, now, state.zone)?)
}
