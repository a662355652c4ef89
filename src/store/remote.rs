//! Remote event table client
//!
//! HTTP backend for a PostgREST-style table (`/rest/v1/<table>`), the shape
//! exposed by hosted Postgres services. Rows use snake_case columns and
//! numeric columns may come back as strings, so decoding is lenient.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::events::{DateRange, Event, Metadata, StoreError, StoreResult};
use crate::store::backend::{BackendKind, EventBackend};

/// Configuration for the remote table client
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the service (e.g. "https://project.example.co")
    pub base_url: String,
    /// API key sent as `apikey` and bearer token
    pub api_key: String,
    /// Table holding quiz events
    pub table: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum rows per fetch
    pub fetch_limit: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            table: "quiz_events".to_string(),
            request_timeout_ms: 5000,
            fetch_limit: 10_000,
        }
    }
}

/// Remote event table backend
pub struct RemoteBackend {
    client: Client,
    config: RemoteConfig,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| StoreError::unavailable("remote", e))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.api_key.is_empty() {
            return request;
        }
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    fn map_request_error(e: reqwest::Error) -> StoreError {
        let reason = if e.is_timeout() {
            "request timeout".to_string()
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            e.to_string()
        };
        StoreError::unavailable("remote", reason)
    }

    async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(StoreError::unavailable(
            "remote",
            format!("API error {}: {}", status.as_u16(), text),
        ))
    }

    /// Query parameters for a fetch, newest first; equal timestamps by insertion
    fn fetch_query(&self, range: Option<&DateRange>) -> Vec<(String, String)> {
        let mut query = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "timestamp.desc,created_at.desc".to_string()),
            ("limit".to_string(), self.config.fetch_limit.to_string()),
        ];
        if let Some(range) = range {
            if range.start != i64::MIN {
                query.push(("timestamp".to_string(), format!("gte.{}", range.start)));
            }
            if range.end != i64::MAX {
                query.push(("timestamp".to_string(), format!("lte.{}", range.end)));
            }
        }
        query
    }
}

#[async_trait]
impl EventBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn append(&self, event: &Event) -> StoreResult<usize> {
        let row = RemoteEventRow::from(event);
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=minimal")
            .json(&[row]);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::check_status(response).await?;
        Ok(0)
    }

    async fn fetch(&self, range: Option<&DateRange>) -> StoreResult<Vec<Event>> {
        let request = self.client.get(self.table_url()).query(&self.fetch_query(range));

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let rows: Vec<RemoteEventRow> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(rows_into_events(rows))
    }

    async fn len(&self) -> StoreResult<usize> {
        // PostgREST has no cheap count without extra headers; report what a fetch sees
        Ok(self.fetch(None).await?.len())
    }
}

/// Reverse rows delivered newest first, so among copies of an id the
/// later write comes after the earlier one
fn rows_into_events(rows: Vec<RemoteEventRow>) -> Vec<Event> {
    let mut events = Vec::with_capacity(rows.len());
    for row in rows.into_iter().rev() {
        match row.into_event() {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(error = %e, "Skipping malformed remote event row"),
        }
    }
    events
}

// ============================================
// Row DTO
// ============================================

/// One row of the remote table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteEventRow {
    pub id: String,
    pub session_id: String,
    pub event_type: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub step: i64,
    #[serde(default)]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub answer_index: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub timestamp: i64,
    #[serde(
        default,
        deserialize_with = "lenient_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_spent_on_step: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl From<&Event> for RemoteEventRow {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            session_id: event.session_id.clone(),
            event_type: event.event_type.as_str().to_string(),
            step: i64::from(event.step),
            step_name: Some(event.step_name.clone()),
            answer: event.answer.clone(),
            answer_index: event.answer_index,
            timestamp: event.timestamp,
            time_spent_on_step: event.time_spent_on_step,
            metadata: event.metadata.clone(),
        }
    }
}

impl RemoteEventRow {
    /// Convert to the canonical event, rejecting unknown types and negative steps
    pub fn into_event(self) -> StoreResult<Event> {
        let event_type = self.event_type.parse()?;
        let step = u32::try_from(self.step)
            .map_err(|_| StoreError::Validation(format!("Invalid step: {}", self.step)))?;

        Ok(Event {
            id: self.id,
            session_id: self.session_id,
            event_type,
            step,
            step_name: self.step_name.unwrap_or_default(),
            answer: self.answer,
            answer_index: self.answer_index,
            timestamp: self.timestamp,
            time_spent_on_step: self.time_spent_on_step,
            metadata: self.metadata,
        })
    }
}

fn value_to_i64<E: de::Error>(value: Value) -> Result<Option<i64>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| E::custom(format!("number out of range: {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(E::custom),
        other => Err(E::custom(format!("expected integer, got {}", other))),
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    value_to_i64(Value::deserialize(deserializer)?)?
        .ok_or_else(|| de::Error::custom("expected integer, got null"))
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    value_to_i64(Value::deserialize(deserializer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    #[test]
    fn test_default_config() {
        let config = RemoteConfig::default();
        assert_eq!(config.table, "quiz_events");
        assert_eq!(config.fetch_limit, 10_000);
    }

    #[test]
    fn test_row_decoding_accepts_stringly_numbers() {
        let json = r#"{
            "id": "e1",
            "session_id": "s1",
            "event_type": "step_view",
            "step": "4",
            "step_name": "Nombre",
            "answer_index": null,
            "timestamp": "1700000000000",
            "time_spent_on_step": 3200,
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let row: RemoteEventRow = serde_json::from_str(json).unwrap();
        let event = row.into_event().unwrap();

        assert_eq!(event.event_type, EventType::StepView);
        assert_eq!(event.step, 4);
        assert_eq!(event.timestamp, 1_700_000_000_000);
        assert_eq!(event.time_spent_on_step, Some(3200));
        assert_eq!(event.answer_index, None);
    }

    #[test]
    fn test_row_rejects_unknown_type() {
        let row = RemoteEventRow {
            id: "e1".to_string(),
            session_id: "s1".to_string(),
            event_type: "page_scroll".to_string(),
            step: 1,
            step_name: None,
            answer: None,
            answer_index: None,
            timestamp: 0,
            time_spent_on_step: None,
            metadata: None,
        };
        assert!(matches!(row.into_event(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_row_from_event_uses_snake_case() {
        let event = Event::new("s1", EventType::QuizComplete, 18, 42).with_id("e9");
        let json = serde_json::to_value(RemoteEventRow::from(&event)).unwrap();
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["event_type"], "quiz_complete");
        assert!(json.get("answer").is_none());
    }

    #[test]
    fn test_newer_remote_row_wins_after_merge() {
        let newer = RemoteEventRow::from(
            &Event::new("s1", EventType::StepView, 2, 500)
                .with_id("dup")
                .time_spent(2),
        );
        let older = RemoteEventRow::from(
            &Event::new("s1", EventType::StepView, 2, 500)
                .with_id("dup")
                .time_spent(1),
        );
        let other =
            RemoteEventRow::from(&Event::new("s1", EventType::StepView, 1, 400).with_id("x"));

        let events = rows_into_events(vec![newer, other, older]);
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].time_spent_on_step, Some(2));

        let merged = crate::store::merge_dedup(events);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "dup");
        assert_eq!(merged[0].time_spent_on_step, Some(2));
    }

    #[test]
    fn test_fetch_query_breaks_timestamp_ties_by_insertion() {
        let backend = RemoteBackend::new(RemoteConfig::default()).unwrap();
        let query = backend.fetch_query(None);
        let order = query.iter().find(|(k, _)| k == "order").map(|(_, v)| v.as_str());
        assert_eq!(order, Some("timestamp.desc,created_at.desc"));
    }

    #[test]
    fn test_fetch_query_bounds() {
        let backend = RemoteBackend::new(RemoteConfig::default()).unwrap();
        let range = DateRange::from_bounds(Some(10), None).unwrap();
        let query = backend.fetch_query(range.as_ref());
        assert!(query.contains(&("timestamp".to_string(), "gte.10".to_string())));
        assert!(!query.iter().any(|(_, v)| v.starts_with("lte.")));
    }

    #[tokio::test]
    async fn test_unreachable_remote_reports_unavailable() {
        let backend = RemoteBackend::new(RemoteConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            request_timeout_ms: 500,
            ..Default::default()
        })
        .unwrap();

        let err = backend.fetch(None).await.unwrap_err();
        assert!(matches!(err, StoreError::BackendUnavailable { .. }));
    }
}
