//! Event Routes
//!
//! Ingestion and raw retrieval of quiz events.
//!
//! - POST /api/v1/events - Single event
//! - POST /api/v1/events/batch - Batch of events
//! - GET /api/v1/events - Filtered event listing (credential required)

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::auth::DashboardAccess;
use crate::api::dto::{
    BatchError, BatchIngestRequest, BatchIngestResponse, EventPayload, EventsResponse,
    IngestResponse, RangeParams,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::events::{parse_range, DateRange};

/// POST /api/v1/events
///
/// Ingest a single event. The store cap is enforced on every append.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EventPayload>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let event = payload.into_event(&state.catalog, state.now())?;
    let receipt = state.store.append(event).await?;

    tracing::debug!(event_id = %receipt.event_id, evicted = receipt.evicted, "Event ingested");

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            success: true,
            event_id: receipt.event_id,
        }),
    ))
}

/// POST /api/v1/events/batch
///
/// Ingest many events; each is validated independently.
pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchIngestRequest>,
) -> ApiResult<(StatusCode, Json<BatchIngestResponse>)> {
    if req.events.is_empty() {
        return Err(ApiError::Validation("Empty batch".to_string()));
    }

    let max = state.config.max_batch;
    if req.events.len() > max {
        return Err(ApiError::Validation(format!(
            "Batch size exceeds maximum of {} events",
            max
        )));
    }

    let now = state.now();
    let mut errors = Vec::new();
    let mut valid = Vec::with_capacity(req.events.len());
    // Position of each valid event in the request
    let mut positions = Vec::with_capacity(req.events.len());

    for (index, payload) in req.events.into_iter().enumerate() {
        match payload.into_event(&state.catalog, now) {
            Ok(event) => {
                positions.push(index);
                valid.push(event);
            }
            Err(e) => errors.push(BatchError {
                index,
                error: e.to_string(),
            }),
        }
    }

    let report = state.store.append_batch(valid).await;
    let accepted = report.accepted;
    errors.extend(report.errors.into_iter().map(|(i, error)| BatchError {
        index: positions.get(i).copied().unwrap_or(i),
        error,
    }));
    errors.sort_by_key(|e| e.index);

    let status = if errors.is_empty() {
        StatusCode::CREATED
    } else if accepted > 0 {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::BAD_REQUEST
    };

    let status_str = if errors.is_empty() { "ok" } else { "partial" };

    tracing::info!(accepted, rejected = errors.len(), "Batch ingested");

    Ok((
        status,
        Json(BatchIngestResponse {
            status: status_str.to_string(),
            accepted,
            rejected: errors.len(),
            errors,
        }),
    ))
}

/// GET /api/v1/events
///
/// Merged, de-duplicated events inside the optional bounds.
pub async fn list_events(
    _access: DashboardAccess,
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Json<EventsResponse>> {
    let now = state.now();
    let range = resolve_bounds(&state, &params, now)?;

    let outcome = state.store.fetch(range).await;

    Ok(Json(EventsResponse {
        total_events: outcome.events.len(),
        events: outcome.events,
        timestamp: now,
        source: outcome.source,
    }))
}

/// Parse optional start/end bounds in the server's zone
pub(crate) fn resolve_bounds(
    state: &AppState,
    params: &RangeParams,
    now: i64,
) -> ApiResult<Option<DateRange>> {
    Ok(parse_range(
        params.start.as_deref(),
        params.end.as_deref(),
        now,
        state.zone,
    )?)
}
