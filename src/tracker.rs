//! Session-tracking context
//!
//! `SessionTracker` is the producer-side state for one quiz session: its id,
//! the step on screen and when that step was entered. Each `track_*` call
//! returns the `Event` to deliver; sending it is the caller's business.

use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::events::{Event, EventType, Metadata, StepCatalog, QUIZ_COMPLETE_NAME};
use crate::store::Clock;

/// Client environment reported with `quiz_start`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: String,
    pub referrer: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub url: String,
}

impl ClientInfo {
    fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("userAgent".into(), Value::from(self.user_agent.clone()));
        metadata.insert("referrer".into(), Value::from(self.referrer.clone()));
        metadata.insert("screenWidth".into(), Value::from(self.screen_width));
        metadata.insert("screenHeight".into(), Value::from(self.screen_height));
        metadata.insert("url".into(), Value::from(self.url.clone()));
        metadata
    }
}

/// Producer-side state for one session
pub struct SessionTracker {
    session_id: String,
    current_step: u32,
    /// Epoch ms of the last step transition; 0 before the quiz starts
    step_start: i64,
    catalog: Arc<StepCatalog>,
    clock: Arc<dyn Clock>,
}

impl SessionTracker {
    /// Start tracking a fresh session with a generated id
    pub fn new(catalog: Arc<StepCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self::resume(Uuid::new_v4().to_string(), catalog, clock)
    }

    /// Continue a session whose id was persisted elsewhere
    pub fn resume(
        session_id: impl Into<String>,
        catalog: Arc<StepCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            current_step: 0,
            step_start: 0,
            catalog,
            clock,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    fn time_spent(&self, now: i64) -> i64 {
        if self.step_start > 0 {
            now - self.step_start
        } else {
            0
        }
    }

    fn event(&self, event_type: EventType, step: u32, now: i64) -> Event {
        Event::new(self.session_id.clone(), event_type, step, now)
            .step_name(self.catalog.name_for(step))
    }

    /// Session entered the quiz at step 0
    pub fn track_start(&mut self, client: &ClientInfo) -> Event {
        let now = self.clock.now_millis();
        self.step_start = now;
        self.current_step = 0;

        self.event(EventType::QuizStart, 0, now)
            .metadata(client.to_metadata())
    }

    /// A step was displayed; time spent is attached only on a step change
    pub fn track_step_view(&mut self, step: u32) -> Event {
        let now = self.clock.now_millis();
        let mut event = self.event(EventType::StepView, step, now);
        if step != self.current_step {
            event = event.time_spent(self.time_spent(now));
        }

        self.step_start = now;
        self.current_step = step;
        event
    }

    pub fn track_answer(&self, step: u32, answer: impl Into<String>, answer_index: i64) -> Event {
        let now = self.clock.now_millis();
        self.event(EventType::AnswerSelected, step, now)
            .answer(answer, Some(answer_index))
            .time_spent(self.time_spent(now))
    }

    /// Slider input, recorded as `"{value} {unit}"`
    pub fn track_slider(&self, step: u32, value: f64, unit: &str) -> Event {
        let now = self.clock.now_millis();
        self.event(EventType::AnswerSelected, step, now)
            .answer(format!("{} {}", value, unit), None)
            .time_spent(self.time_spent(now))
            .meta("value", value)
            .meta("unit", unit)
    }

    pub fn track_step_complete(&self, step: u32) -> Event {
        let now = self.clock.now_millis();
        self.event(EventType::StepComplete, step, now)
            .time_spent(self.time_spent(now))
    }

    /// Quiz finished; lands on the terminal step
    pub fn track_complete(&self, final_data: Option<Metadata>) -> Event {
        let now = self.clock.now_millis();
        let mut event = self
            .event(EventType::QuizComplete, self.catalog.terminal_step(), now)
            .step_name(QUIZ_COMPLETE_NAME);
        event.metadata = final_data;
        event
    }

    pub fn track_abandon(&self, last_step: u32) -> Event {
        let now = self.clock.now_millis();
        self.event(EventType::QuizAbandon, last_step, now)
            .time_spent(self.time_spent(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FixedClock;

    fn tracker(clock: Arc<FixedClock>) -> SessionTracker {
        SessionTracker::resume("s1", Arc::new(StepCatalog::reference()), clock)
    }

    #[test]
    fn test_time_spent_is_zero_before_start() {
        let clock = Arc::new(FixedClock::new(5000));
        let t = tracker(clock);
        let event = t.track_answer(1, "5-10 kg", 0);
        assert_eq!(event.time_spent_on_step, Some(0));
    }

    #[test]
    fn test_start_carries_client_info() {
        let clock = Arc::new(FixedClock::new(1000));
        let mut t = tracker(clock);
        let event = t.track_start(&ClientInfo {
            user_agent: "test".to_string(),
            screen_width: 390,
            screen_height: 844,
            ..Default::default()
        });

        assert_eq!(event.event_type, EventType::QuizStart);
        assert_eq!(event.step_name, "Intro");
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.screen_width(), Some(390.0));
        assert_eq!(event.metadata.unwrap()["userAgent"], "test");
    }

    #[test]
    fn test_step_view_time_spent_only_on_change() {
        let clock = Arc::new(FixedClock::new(1000));
        let mut t = tracker(Arc::clone(&clock));
        t.track_start(&ClientInfo::default());

        clock.advance(2500);
        let view = t.track_step_view(1);
        assert_eq!(view.time_spent_on_step, Some(2500));
        assert_eq!(view.step_name, "Cuantos kilos perder");

        clock.advance(700);
        let repeat = t.track_step_view(1);
        assert_eq!(repeat.time_spent_on_step, None);
        assert_eq!(t.current_step(), 1);

        clock.advance(300);
        let answer = t.track_answer(1, "5-10 kg", 2);
        assert_eq!(answer.time_spent_on_step, Some(300));
        assert_eq!(answer.answer_index, Some(2));
    }

    #[test]
    fn test_slider_answer_format() {
        let clock = Arc::new(FixedClock::new(1000));
        let t = tracker(clock);
        let event = t.track_slider(11, 72.0, "kg");
        assert_eq!(event.answer.as_deref(), Some("72 kg"));
        let metadata = event.metadata.unwrap();
        assert_eq!(metadata["unit"], "kg");
        assert_eq!(metadata["value"], 72.0);
    }

    #[test]
    fn test_complete_and_abandon() {
        let clock = Arc::new(FixedClock::new(1000));
        let mut t = tracker(Arc::clone(&clock));
        t.track_start(&ClientInfo::default());
        clock.advance(4000);

        let complete = t.track_complete(None);
        assert_eq!(complete.step, 18);
        assert_eq!(complete.step_name, QUIZ_COMPLETE_NAME);
        assert_eq!(complete.timestamp, 5000);

        let abandon = t.track_abandon(7);
        assert_eq!(abandon.step, 7);
        assert_eq!(abandon.time_spent_on_step, Some(4000));
    }

    #[test]
    fn test_fresh_sessions_get_distinct_ids() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
        let catalog = Arc::new(StepCatalog::reference());
        let a = SessionTracker::new(Arc::clone(&catalog), Arc::clone(&clock));
        let b = SessionTracker::new(catalog, clock);
        assert_ne!(a.session_id(), b.session_id());
    }
}
