//! Session Reconstructor
//!
//! Turns a flat, arbitrarily ordered event list into per-session timelines
//! sorted by timestamp. Pure function of its input.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::events::{in_range, DateRange, Event, EventType};

/// How a session ended (as far as the observed events tell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Has a `quiz_complete` event
    Completed,
    /// No completion and furthest step below the terminal step
    Abandoned,
    /// Reached the terminal step without a completion event
    InProgress,
}

/// One session's observed timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Session<'a> {
    pub id: &'a str,
    /// Events sorted ascending by timestamp (stable)
    pub events: Vec<&'a Event>,
}

impl<'a> Session<'a> {
    pub fn first(&self) -> Option<&'a Event> {
        self.events.first().copied()
    }

    pub fn last(&self) -> Option<&'a Event> {
        self.events.last().copied()
    }

    /// First event of a type in time order
    pub fn find(&self, event_type: EventType) -> Option<&'a Event> {
        self.events
            .iter()
            .copied()
            .find(|e| e.event_type == event_type)
    }

    pub fn is_completed(&self) -> bool {
        self.find(EventType::QuizComplete).is_some()
    }

    /// Furthest step observed
    pub fn max_step(&self) -> u32 {
        self.events.iter().map(|e| e.step).max().unwrap_or(0)
    }

    pub fn outcome(&self, terminal_step: u32) -> SessionOutcome {
        if self.is_completed() {
            SessionOutcome::Completed
        } else if self.max_step() < terminal_step {
            SessionOutcome::Abandoned
        } else {
            SessionOutcome::InProgress
        }
    }

    /// Seconds between first and last event (0 for a single event)
    pub fn duration_secs(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => elapsed_secs(first.timestamp, last.timestamp),
            _ => 0.0,
        }
    }

    /// Seconds from `quiz_start` to `quiz_complete`, when both are present
    pub fn completion_time_secs(&self) -> Option<f64> {
        let start = self.find(EventType::QuizStart)?;
        let complete = self.find(EventType::QuizComplete)?;
        Some(elapsed_secs(start.timestamp, complete.timestamp))
    }
}

/// Seconds from `from` to `to`, saturating at the ends of the i64 range
fn elapsed_secs(from: i64, to: i64) -> f64 {
    to.saturating_sub(from) as f64 / 1000.0
}

/// Events inside `range`, with duplicate ids collapsed to their last occurrence.
///
/// Survivors keep the position of that last occurrence.
pub fn distinct_events<'a>(events: &'a [Event], range: Option<&DateRange>) -> Vec<&'a Event> {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        last_index.insert(event.id.as_str(), i);
    }

    events
        .iter()
        .enumerate()
        .filter(|(i, event)| last_index.get(event.id.as_str()) == Some(i))
        .map(|(_, event)| event)
        .filter(|event| in_range(range, event.timestamp))
        .collect()
}

/// Group already de-duplicated events by session id.
///
/// Each timeline is stably sorted by timestamp, so ties keep their relative
/// input order.
pub fn group_sessions<'a>(events: &[&'a Event]) -> BTreeMap<&'a str, Session<'a>> {
    let mut sessions: BTreeMap<&'a str, Session<'a>> = BTreeMap::new();
    for event in events.iter().copied() {
        sessions
            .entry(event.session_id.as_str())
            .or_insert_with(|| Session {
                id: event.session_id.as_str(),
                events: Vec::new(),
            })
            .events
            .push(event);
    }

    for session in sessions.values_mut() {
        session.events.sort_by_key(|e| e.timestamp);
    }

    sessions
}

/// Group a raw event list into sessions keyed by session id
pub fn reconstruct(events: &[Event]) -> BTreeMap<&str, Session<'_>> {
    group_sessions(&distinct_events(events, None))
}
