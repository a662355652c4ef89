//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::analytics::{AdvancedMetrics, DashboardSnapshot};
use crate::api::error::{ApiError, ApiResult};
use crate::events::{DateRange, Event, EventType, Metadata, StepCatalog};
use crate::store::{BackendFailure, BackendStats, DataSource};

// ============================================
// INGEST DTOs
// ============================================

/// Event as sent by producers.
///
/// Every field is optional at the wire level so missing required fields
/// surface as validation errors rather than body-decoding failures.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub step: Option<i64>,
    #[serde(default)]
    pub step_name: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub answer_index: Option<i64>,
    /// Epoch ms, defaults to the server clock
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub time_spent_on_step: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{} is required", field)))
}

impl EventPayload {
    /// Validate and convert to a stored event.
    ///
    /// A missing `stepName` is filled from the catalog.
    pub fn into_event(self, catalog: &StepCatalog, now: i64) -> ApiResult<Event> {
        let id = required(self.id, "id")?;
        let session_id = required(self.session_id, "sessionId")?;
        let event_type: EventType = required(self.event_type, "eventType")?.parse()?;

        let step = match self.step {
            None => 0,
            Some(step) => u32::try_from(step)
                .map_err(|_| ApiError::Validation(format!("Invalid step: {}", step)))?,
        };

        let step_name = self
            .step_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| catalog.name_for(step));

        Ok(Event {
            id,
            session_id,
            event_type,
            step,
            step_name,
            answer: self.answer,
            answer_index: self.answer_index,
            timestamp: self.timestamp.unwrap_or(now),
            time_spent_on_step: self.time_spent_on_step,
            metadata: self.metadata,
        })
    }
}

/// Single event ingest response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    /// Identifier of the accepted event
    pub event_id: String,
}

/// Batch ingest request
#[derive(Debug, Deserialize)]
pub struct BatchIngestRequest {
    /// Events to ingest, in order
    pub events: Vec<EventPayload>,
}

/// Batch ingest response
#[derive(Debug, Serialize)]
pub struct BatchIngestResponse {
    /// Status: "ok" or "partial"
    pub status: String,
    /// Number of events accepted
    pub accepted: usize,
    /// Number of events rejected
    pub rejected: usize,
    /// Errors for rejected events
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchError>,
}

/// Error for a single event in batch ingest
#[derive(Debug, Serialize)]
pub struct BatchError {
    /// Index of the failed event
    pub index: usize,
    /// Error message
    pub error: String,
}

// ============================================
// RETRIEVAL DTOs
// ============================================

/// Optional inclusive bounds; each accepts epoch ms, RFC 3339,
/// `YYYY-MM-DD` or `now-<n>{h,d,w,m}`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    #[serde(default, alias = "startDate")]
    pub start: Option<String>,
    #[serde(default, alias = "endDate")]
    pub end: Option<String>,
}

/// Raw event listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub total_events: usize,
    /// Server time (epoch ms)
    pub timestamp: i64,
    pub source: DataSource,
}

// ============================================
// DASHBOARD DTOs
// ============================================

/// Dashboard query: a preset (`24h`, `7d`, `30d`, `90d`, `all`) or
/// explicit bounds, which take precedence
#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default, alias = "startDate")]
    pub start: Option<String>,
    #[serde(default, alias = "endDate")]
    pub end: Option<String>,
}

/// Resolved inclusive window in epoch ms
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RangeDto {
    pub start: i64,
    pub end: i64,
}

impl From<DateRange> for RangeDto {
    fn from(range: DateRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

/// Dashboard snapshot plus advanced metrics for the same window
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub range: RangeDto,
    pub source: DataSource,
    /// Server time (epoch ms)
    pub generated_at: i64,
    #[serde(flatten)]
    pub snapshot: DashboardSnapshot,
    pub advanced: AdvancedMetrics,
    /// Backends that could not be read for this response
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<BackendFailure>,
}

// ============================================
// EXPORT DTOs
// ============================================

/// Export query parameters
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// csv, json or ndjson
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_format() -> String {
    "json".to_string()
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,
    /// Status of the primary store
    pub store: String,
    /// Per-backend counters
    pub backends: Vec<BackendStats>,
    /// Seconds since server start
    pub uptime_seconds: u64,
    /// Crate version
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> EventPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_payload_requires_fields() {
        let catalog = StepCatalog::reference();

        let missing_id = payload(r#"{"sessionId": "s1", "eventType": "step_view"}"#);
        assert!(matches!(
            missing_id.into_event(&catalog, 0),
            Err(ApiError::Validation(m)) if m.contains("id")
        ));

        let empty_session = payload(r#"{"id": "e1", "sessionId": "", "eventType": "step_view"}"#);
        assert!(empty_session.into_event(&catalog, 0).is_err());

        let bad_type = payload(r#"{"id": "e1", "sessionId": "s1", "eventType": "scroll"}"#);
        assert!(matches!(
            bad_type.into_event(&catalog, 0),
            Err(ApiError::Store(_))
        ));

        let negative = payload(r#"{"id": "e1", "sessionId": "s1", "eventType": "step_view", "step": -1}"#);
        assert!(negative.into_event(&catalog, 0).is_err());
    }

    #[test]
    fn test_payload_fills_defaults() {
        let catalog = StepCatalog::reference();
        let event = payload(r#"{"id": "e1", "sessionId": "s1", "eventType": "step_view", "step": 4}"#)
            .into_event(&catalog, 777)
            .unwrap();

        assert_eq!(event.step_name, "Nombre");
        assert_eq!(event.timestamp, 777);
        assert_eq!(event.event_type, EventType::StepView);
    }

    #[test]
    fn test_range_params_accept_original_names() {
        let params: RangeParams =
            serde_json::from_str(r#"{"startDate": "2024-01-01", "endDate": "2024-01-31"}"#).unwrap();
        assert_eq!(params.start.as_deref(), Some("2024-01-01"));
        assert_eq!(params.end.as_deref(), Some("2024-01-31"));
    }
}
