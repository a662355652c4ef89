//! Core data types for quiz events
//!
//! This module defines the canonical event record emitted by the quiz
//! producer layer:
//! - `Event`: A single immutable user action
//! - `EventType`: The closed set of lifecycle/interaction kinds
//! - `Metadata`: The open, producer-defined side channel

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::events::error::{StoreError, StoreResult};

/// Open key-value bag attached to events.
///
/// Aggregation only ever reads `screenWidth` from it.
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key used for device classification
pub const SCREEN_WIDTH_KEY: &str = "screenWidth";

/// Kind of user action an event records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Session entered the quiz (counts as a view of step 0)
    QuizStart,
    /// A step was displayed
    StepView,
    /// The user advanced past a step
    StepComplete,
    /// An answer (or slider value) was chosen
    AnswerSelected,
    /// The quiz reached its terminal step
    QuizComplete,
    /// The user left mid-flow
    QuizAbandon,
}

impl EventType {
    /// Get all event types for iteration
    pub fn all() -> &'static [EventType] {
        &[
            EventType::QuizStart,
            EventType::StepView,
            EventType::StepComplete,
            EventType::AnswerSelected,
            EventType::QuizComplete,
            EventType::QuizAbandon,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::QuizStart => "quiz_start",
            EventType::StepView => "step_view",
            EventType::StepComplete => "step_complete",
            EventType::AnswerSelected => "answer_selected",
            EventType::QuizComplete => "quiz_complete",
            EventType::QuizAbandon => "quiz_abandon",
        }
    }

    /// Whether this event counts as a view of its step
    pub fn is_view(&self) -> bool {
        matches!(self, EventType::StepView | EventType::QuizStart)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::Validation(format!("Unknown eventType: {}", s)))
    }
}

/// A single recorded user action
///
/// Events are immutable once created; a retried append with the same `id`
/// supersedes the earlier copy (see the store's de-duplication rule).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Globally unique identifier
    pub id: String,
    /// Browsing session this event belongs to
    pub session_id: String,
    /// What happened
    pub event_type: EventType,
    /// Index into the step catalog
    pub step: u32,
    /// Label resolved from the step catalog
    #[serde(default)]
    pub step_name: String,
    /// Chosen answer text (answer_selected only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Position of the chosen answer (answer_selected only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_index: Option<i64>,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Milliseconds since the previous step transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_on_step: Option<i64>,
    /// Producer-defined extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Event {
    /// Create a new event with a freshly generated id
    pub fn new(
        session_id: impl Into<String>,
        event_type: EventType,
        step: u32,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            event_type,
            step,
            step_name: String::new(),
            answer: None,
            answer_index: None,
            timestamp,
            time_spent_on_step: None,
            metadata: None,
        }
    }

    /// Builder method: override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder method: set the step label
    pub fn step_name(mut self, name: impl Into<String>) -> Self {
        self.step_name = name.into();
        self
    }

    /// Builder method: set the chosen answer
    pub fn answer(mut self, answer: impl Into<String>, index: Option<i64>) -> Self {
        self.answer = Some(answer.into());
        self.answer_index = index;
        self
    }

    /// Builder method: set time spent on the step (ms)
    pub fn time_spent(mut self, millis: i64) -> Self {
        self.time_spent_on_step = Some(millis);
        self
    }

    /// Builder method: add a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    /// Builder method: replace the whole metadata bag
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check the fields every stored event must carry
    pub fn validate(&self) -> StoreResult<()> {
        if self.id.trim().is_empty() {
            return Err(StoreError::Validation("id is required".to_string()));
        }
        if self.session_id.trim().is_empty() {
            return Err(StoreError::Validation("sessionId is required".to_string()));
        }
        Ok(())
    }

    /// Positive time spent on the step, in milliseconds
    pub fn positive_time_spent(&self) -> Option<i64> {
        self.time_spent_on_step.filter(|ms| *ms > 0)
    }

    /// Non-empty answer text
    pub fn recorded_answer(&self) -> Option<&str> {
        self.answer.as_deref().filter(|a| !a.is_empty())
    }

    /// Screen width reported by the producer, if any.
    ///
    /// Accepts numbers and numeric strings; zero counts as missing.
    pub fn screen_width(&self) -> Option<f64> {
        let value = self.metadata.as_ref()?.get(SCREEN_WIDTH_KEY)?;
        let width = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (width > 0.0).then_some(width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip_names() {
        for t in EventType::all() {
            let parsed: EventType = t.as_str().parse().unwrap();
            assert_eq!(parsed, *t);
        }
        assert!("quiz_restart".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_wire_format_is_camel_case() {
        let event = Event::new("s1", EventType::AnswerSelected, 3, 1000)
            .with_id("e1")
            .answer("Abdomen", Some(2))
            .time_spent(4200);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["eventType"], "answer_selected");
        assert_eq!(json["answerIndex"], 2);
        assert_eq!(json["timeSpentOnStep"], 4200);
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_event_accepts_producer_payload() {
        let json = r#"{
            "id": "e1",
            "sessionId": "s1",
            "eventType": "quiz_start",
            "step": 0,
            "stepName": "Intro",
            "timestamp": 1700000000000,
            "metadata": {"screenWidth": 390, "userAgent": "x"}
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, EventType::QuizStart);
        assert_eq!(event.screen_width(), Some(390.0));
    }

    #[test]
    fn test_validate() {
        let event = Event::new("s1", EventType::StepView, 1, 0);
        assert!(event.validate().is_ok());

        let no_id = event.clone().with_id("  ");
        assert!(matches!(no_id.validate(), Err(StoreError::Validation(_))));

        let no_session = Event::new("", EventType::StepView, 1, 0);
        assert!(no_session.validate().is_err());
    }

    #[test]
    fn test_screen_width_variants() {
        let base = Event::new("s", EventType::QuizStart, 0, 0);
        assert_eq!(base.screen_width(), None);
        assert_eq!(base.clone().meta("screenWidth", 0).screen_width(), None);
        assert_eq!(
            base.clone().meta("screenWidth", "1024").screen_width(),
            Some(1024.0)
        );
        assert_eq!(base.meta("screenWidth", true).screen_width(), None);
    }

    #[test]
    fn test_positive_time_spent() {
        let event = Event::new("s", EventType::StepView, 1, 0);
        assert_eq!(event.positive_time_spent(), None);
        assert_eq!(event.clone().time_spent(0).positive_time_spent(), None);
        assert_eq!(event.time_spent(1500).positive_time_spent(), Some(1500));
    }
}
