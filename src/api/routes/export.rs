//! Export Routes
//!
//! Download of the merged event log for backup and offline analysis.
//!
//! - GET /api/v1/export - Export events as csv, json or ndjson

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::api::auth::DashboardAccess;
use crate::api::dto::{ExportParams, RangeParams};
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::events::resolve_bounds;
use crate::api::state::AppState;
use crate::events::Event;

/// Supported download formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Ndjson,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
            ExportFormat::Ndjson => "application/x-ndjson",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Ndjson => "ndjson",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "ndjson" => Ok(ExportFormat::Ndjson),
            other => Err(ApiError::Validation(format!(
                "Unsupported export format: {} (expected csv, json or ndjson)",
                other
            ))),
        }
    }
}

/// GET /api/v1/export
///
/// Export events in the requested format as an attachment.
pub async fn export_events(
    _access: DashboardAccess,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let format: ExportFormat = params.format.parse()?;
    let bounds = RangeParams {
        start: params.start,
        end: params.end,
    };
    let now = state.now();
    let range = resolve_bounds(&state, &bounds, now)?;

    let events = state.store.fetch_all(range).await;

    let body = match format {
        ExportFormat::Csv => format_csv(&events)?,
        ExportFormat::Json => format_json(&events)?,
        ExportFormat::Ndjson => format_ndjson(&events)?,
    };

    let stamp = DateTime::<Utc>::from_timestamp_millis(now)
        .map(|dt| dt.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| now.to_string());
    let filename = format!("quizpulse_export_{}.{}", stamp, format.extension());

    tracing::info!(events = events.len(), format = ?format, "Export generated");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(body),
    )
        .into_response())
}

const CSV_HEADER: [&str; 10] = [
    "id",
    "sessionId",
    "eventType",
    "step",
    "stepName",
    "answer",
    "answerIndex",
    "timestamp",
    "timeSpentOnStep",
    "metadata",
];

/// Format as CSV, metadata as an embedded JSON column
pub fn format_csv(events: &[Event]) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| ApiError::Internal(format!("CSV error: {}", e));

    writer.write_record(CSV_HEADER).map_err(csv_err)?;

    for event in events {
        let metadata = match &event.metadata {
            Some(m) => serde_json::to_string(m)
                .map_err(|e| ApiError::Internal(format!("JSON error: {}", e)))?,
            None => String::new(),
        };
        let opt = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();

        writer
            .write_record([
                event.id.clone(),
                event.session_id.clone(),
                event.event_type.as_str().to_string(),
                event.step.to_string(),
                event.step_name.clone(),
                event.answer.clone().unwrap_or_default(),
                opt(event.answer_index),
                event.timestamp.to_string(),
                opt(event.time_spent_on_step),
                metadata,
            ])
            .map_err(csv_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV error: {}", e)))
}

/// Format as a pretty JSON array
pub fn format_json(events: &[Event]) -> ApiResult<Vec<u8>> {
    serde_json::to_vec_pretty(events).map_err(|e| ApiError::Internal(format!("JSON error: {}", e)))
}

/// Format as newline-delimited JSON
pub fn format_ndjson(events: &[Event]) -> ApiResult<Vec<u8>> {
    let mut out = Vec::new();
    for event in events {
        serde_json::to_writer(&mut out, event)
            .map_err(|e| ApiError::Internal(format!("JSON error: {}", e)))?;
        out.push(b'\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    fn events() -> Vec<Event> {
        vec![
            Event::new("s1", EventType::AnswerSelected, 1, 1000)
                .with_id("e1")
                .step_name("Cuantos kilos perder")
                .answer("5-10 kg, maybe \"more\"", Some(1))
                .meta("unit", "kg"),
            Event::new("s1", EventType::StepView, 2, 2000).with_id("e2"),
        ]
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_csv_quotes_and_reads_back() {
        let bytes = format_csv(&events()).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());

        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(1), Some("sessionId"));

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(5), Some("5-10 kg, maybe \"more\""));
        assert_eq!(rows[0].get(9), Some(r#"{"unit":"kg"}"#));
        assert_eq!(rows[1].get(6), Some(""));
    }

    #[test]
    fn test_ndjson_one_line_per_event() {
        let bytes = format_ndjson(&events()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Event = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, "e1");
    }
}
