//! Aggregation Engine
//!
//! Computes the dashboard snapshot from a raw event collection:
//! session classification, per-step statistics, the conversion funnel,
//! answer distribution, daily time series and the recent-event feed.
//!
//! # Pipeline
//!
//! ```text
//! events → range filter + id de-dup → sessions → classify
//!                                    ↘ per-step pass → stats → funnel
//! ```
//!
//! Every function here is total: sparse or malformed input yields zeroed
//! fields, never an error.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::analytics::session::{distinct_events, group_sessions, SessionOutcome};
use crate::analytics::{mean, percent, AggregateOptions};
use crate::events::{Event, EventType, StepCatalog};

/// Statistics for one catalog step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStats {
    pub step: u32,
    pub step_name: String,
    /// `step_view` events (plus `quiz_start` for step 0)
    pub views: u64,
    pub completions: u64,
    pub abandonments: u64,
    /// Percentage of views that ended in an abandon event
    pub abandon_rate: f64,
    /// Mean positive time spent, in seconds
    pub avg_time_spent: f64,
    /// Answer text → occurrences
    pub answers: BTreeMap<String, u64>,
}

/// One funnel stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    pub step: u32,
    pub name: String,
    pub users: u64,
    pub dropoff: u64,
    pub dropoff_rate: f64,
}

/// Activity on one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    /// `YYYY-MM-DD` in the configured zone
    pub date: String,
    /// Distinct sessions with at least one event that day
    pub sessions: u64,
    /// `quiz_complete` events that day
    pub completions: u64,
}

/// Full dashboard snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub abandoned_sessions: u64,
    pub in_progress_sessions: u64,
    /// Percentage in [0, 100]
    pub completion_rate: f64,
    /// Seconds from `quiz_start` to `quiz_complete`
    pub avg_completion_time: f64,
    pub total_events: u64,
    pub step_stats: Vec<StepStats>,
    pub funnel: Vec<FunnelStep>,
    /// Step → answer text → occurrences, steps with answers only
    pub answer_distribution: BTreeMap<u32, BTreeMap<String, u64>>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    /// Most recent events, newest first
    pub recent_events: Vec<Event>,
}

#[derive(Default)]
struct StepAccumulator {
    views: u64,
    completions: u64,
    abandonments: u64,
    time_total_ms: i64,
    time_samples: u64,
    answers: BTreeMap<String, u64>,
}

/// Compute the dashboard snapshot for `events`
pub fn compute_dashboard(
    events: &[Event],
    catalog: &StepCatalog,
    options: &AggregateOptions,
) -> DashboardSnapshot {
    let events = distinct_events(events, options.range.as_ref());
    let sessions = group_sessions(&events);

    // Session classification
    let terminal = catalog.terminal_step();
    let mut completed = 0u64;
    let mut abandoned = 0u64;
    let mut in_progress = 0u64;
    let mut completion_times = Vec::new();

    for session in sessions.values() {
        match session.outcome(terminal) {
            SessionOutcome::Completed => {
                completed += 1;
                if let Some(secs) = session.completion_time_secs() {
                    completion_times.push(secs);
                }
            }
            SessionOutcome::Abandoned => abandoned += 1,
            SessionOutcome::InProgress => in_progress += 1,
        }
    }
    let total_sessions = sessions.len() as u64;

    let step_stats = step_stats(&events, catalog);
    let funnel = funnel(&step_stats, total_sessions);

    let answer_distribution = step_stats
        .iter()
        .filter(|s| !s.answers.is_empty())
        .map(|s| (s.step, s.answers.clone()))
        .collect();

    let time_series_data = time_series(&events, options);
    let recent_events = recent_events(&events, options.recent_limit);

    tracing::debug!(
        events = events.len(),
        sessions = total_sessions,
        completed,
        "Computed dashboard snapshot"
    );

    DashboardSnapshot {
        total_sessions,
        completed_sessions: completed,
        abandoned_sessions: abandoned,
        in_progress_sessions: in_progress,
        completion_rate: percent(completed, total_sessions),
        avg_completion_time: mean(&completion_times),
        total_events: events.len() as u64,
        step_stats,
        funnel,
        answer_distribution,
        time_series_data,
        recent_events,
    }
}

/// One `StepStats` per catalog step, in catalog order
fn step_stats(events: &[&Event], catalog: &StepCatalog) -> Vec<StepStats> {
    let mut acc: Vec<StepAccumulator> = (0..catalog.len()).map(|_| StepAccumulator::default()).collect();

    for event in events {
        // Unknown steps still count toward sessions, just not per-step stats
        let Some(slot) = acc.get_mut(event.step as usize) else {
            continue;
        };

        match event.event_type {
            t if t.is_view() => slot.views += 1,
            EventType::StepComplete => slot.completions += 1,
            EventType::QuizAbandon => slot.abandonments += 1,
            EventType::AnswerSelected => {
                if let Some(answer) = event.recorded_answer() {
                    *slot.answers.entry(answer.to_string()).or_insert(0) += 1;
                }
            }
            _ => {}
        }

        if let Some(ms) = event.positive_time_spent() {
            slot.time_total_ms = slot.time_total_ms.saturating_add(ms);
            slot.time_samples += 1;
        }
    }

    catalog
        .steps()
        .iter()
        .zip(acc)
        .map(|(def, slot)| StepStats {
            step: def.step,
            step_name: def.name.clone(),
            views: slot.views,
            completions: slot.completions,
            abandonments: slot.abandonments,
            abandon_rate: percent(slot.abandonments, slot.views),
            avg_time_spent: dwell_seconds(slot.time_total_ms, slot.time_samples),
            answers: slot.answers,
        })
        .collect()
}

/// Mean dwell time in seconds, 0 with no samples
pub(crate) fn dwell_seconds(total_ms: i64, samples: u64) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total_ms as f64 / samples as f64 / 1000.0
    }
}

fn funnel(stats: &[StepStats], total_sessions: u64) -> Vec<FunnelStep> {
    let mut funnel = Vec::with_capacity(stats.len());
    let mut previous: Option<u64> = None;

    for stat in stats {
        let users = match previous {
            None if stat.views == 0 => total_sessions,
            _ => stat.views,
        };
        let (dropoff, dropoff_rate) = match previous {
            Some(prev) => {
                let dropoff = prev.saturating_sub(users);
                (dropoff, percent(dropoff, prev))
            }
            None => (0, 0.0),
        };

        funnel.push(FunnelStep {
            step: stat.step,
            name: stat.step_name.clone(),
            users,
            dropoff,
            dropoff_rate,
        });
        previous = Some(users);
    }

    funnel
}

fn time_series(events: &[&Event], options: &AggregateOptions) -> Vec<TimeSeriesPoint> {
    let mut days: BTreeMap<String, (BTreeSet<&str>, u64)> = BTreeMap::new();

    for event in events {
        let day = days.entry(options.zone.date_key(event.timestamp)).or_default();
        day.0.insert(event.session_id.as_str());
        if event.event_type == EventType::QuizComplete {
            day.1 += 1;
        }
    }

    days.into_iter()
        .map(|(date, (sessions, completions))| TimeSeriesPoint {
            date,
            sessions: sessions.len() as u64,
            completions,
        })
        .collect()
}

fn recent_events(events: &[&Event], limit: usize) -> Vec<Event> {
    let mut sorted: Vec<&Event> = events.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.into_iter().take(limit).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DateRange, ZonePolicy};

    const DAY: i64 = 24 * 3600 * 1000;

    fn ev(id: &str, session: &str, event_type: EventType, step: u32, ts: i64) -> Event {
        Event::new(session, event_type, step, ts).with_id(id)
    }

    fn dashboard(events: &[Event]) -> DashboardSnapshot {
        compute_dashboard(events, &StepCatalog::reference(), &AggregateOptions::default())
    }

    #[test]
    fn test_completed_session_scenario() {
        let events = vec![
            ev("1", "A", EventType::QuizStart, 0, 0),
            ev("2", "A", EventType::StepView, 1, 1000),
            ev("3", "A", EventType::QuizComplete, 18, 5000),
        ];
        let snap = dashboard(&events);

        assert_eq!(snap.total_sessions, 1);
        assert_eq!(snap.completed_sessions, 1);
        assert_eq!(snap.completion_rate, 100.0);
        assert_eq!(snap.avg_completion_time, 5.0);
        assert_eq!(snap.total_events, 3);
    }

    #[test]
    fn test_abandoned_session_scenario() {
        let events = vec![
            ev("1", "A", EventType::QuizStart, 0, 0),
            ev("2", "A", EventType::StepView, 3, 2000),
        ];
        let snap = dashboard(&events);

        assert_eq!(snap.abandoned_sessions, 1);
        assert_eq!(snap.completed_sessions, 0);
        assert_eq!(snap.in_progress_sessions, 0);
        assert_eq!(snap.completion_rate, 0.0);
        assert_eq!(snap.avg_completion_time, 0.0);
    }

    #[test]
    fn test_empty_input_is_zeroed() {
        let snap = dashboard(&[]);
        assert_eq!(snap.total_sessions, 0);
        assert_eq!(snap.completion_rate, 0.0);
        assert_eq!(snap.step_stats.len(), 19);
        assert!(snap.step_stats.iter().all(|s| s.abandon_rate == 0.0));
        assert!(snap.funnel.iter().all(|f| f.users == 0 && f.dropoff == 0));
        assert!(snap.answer_distribution.is_empty());
        assert!(snap.time_series_data.is_empty());
        assert!(snap.recent_events.is_empty());
    }

    #[test]
    fn test_completion_without_start_is_excluded_from_mean() {
        let events = vec![
            // Session A: both boundaries, 10s
            ev("a1", "A", EventType::QuizStart, 0, 0),
            ev("a2", "A", EventType::QuizComplete, 18, 10_000),
            // Session B: completed but no quiz_start
            ev("b1", "B", EventType::StepView, 5, 0),
            ev("b2", "B", EventType::QuizComplete, 18, 99_000),
        ];
        let snap = dashboard(&events);
        assert_eq!(snap.completed_sessions, 2);
        assert_eq!(snap.avg_completion_time, 10.0);
    }

    #[test]
    fn test_session_counts_add_up() {
        let events = vec![
            ev("1", "A", EventType::QuizStart, 0, 0),
            ev("2", "A", EventType::QuizComplete, 18, 10),
            ev("3", "B", EventType::StepView, 4, 0),
            ev("4", "C", EventType::StepView, 18, 0),
            ev("5", "D", EventType::QuizAbandon, 7, 0),
        ];
        let snap = dashboard(&events);
        assert_eq!(snap.total_sessions, 4);
        assert_eq!(snap.completed_sessions, 1);
        assert_eq!(snap.abandoned_sessions, 2);
        assert_eq!(snap.in_progress_sessions, 1);
        assert!(snap.completed_sessions + snap.abandoned_sessions <= snap.total_sessions);
        assert_eq!(snap.completion_rate, 25.0);
    }

    #[test]
    fn test_step_stats() {
        let events = vec![
            ev("1", "A", EventType::QuizStart, 0, 0),
            ev("2", "A", EventType::StepView, 1, 10).time_spent(2000),
            ev("3", "B", EventType::StepView, 1, 10).time_spent(4000),
            ev("4", "B", EventType::StepView, 1, 20).time_spent(0),
            ev("5", "A", EventType::AnswerSelected, 1, 30).answer("5-10 kg", Some(1)),
            ev("6", "B", EventType::AnswerSelected, 1, 30).answer("5-10 kg", Some(1)),
            ev("7", "B", EventType::AnswerSelected, 1, 40).answer("", None),
            ev("8", "A", EventType::StepComplete, 1, 50),
            ev("9", "B", EventType::QuizAbandon, 1, 60),
            ev("10", "C", EventType::StepView, 42, 60),
        ];
        let snap = dashboard(&events);

        let step0 = &snap.step_stats[0];
        assert_eq!(step0.views, 1);
        assert_eq!(step0.step_name, "Intro");

        let step1 = &snap.step_stats[1];
        assert_eq!(step1.views, 3);
        assert_eq!(step1.completions, 1);
        assert_eq!(step1.abandonments, 1);
        assert!((step1.abandon_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(step1.avg_time_spent, 3.0);
        assert_eq!(step1.answers.get("5-10 kg"), Some(&2));
        assert_eq!(step1.answers.len(), 1);

        assert_eq!(snap.answer_distribution.len(), 1);
        assert_eq!(snap.answer_distribution[&1]["5-10 kg"], 2);

        // Unknown step 42 is a session but has no stats row
        assert_eq!(snap.total_sessions, 3);
        assert_eq!(snap.step_stats.len(), 19);
    }

    #[test]
    fn test_funnel_dropoff_is_clamped() {
        let events = vec![
            ev("1", "A", EventType::QuizStart, 0, 0),
            ev("2", "A", EventType::StepView, 1, 1),
            ev("3", "B", EventType::StepView, 1, 1),
            ev("4", "C", EventType::StepView, 1, 1),
            ev("5", "A", EventType::StepView, 2, 2),
        ];
        let snap = dashboard(&events);

        assert_eq!(snap.funnel[0].users, 1);
        assert_eq!(snap.funnel[0].dropoff, 0);
        // More users at step 1 than step 0: no negative dropoff
        assert_eq!(snap.funnel[1].users, 3);
        assert_eq!(snap.funnel[1].dropoff, 0);
        assert_eq!(snap.funnel[1].dropoff_rate, 0.0);
        assert_eq!(snap.funnel[2].users, 1);
        assert_eq!(snap.funnel[2].dropoff, 2);
        assert!((snap.funnel[2].dropoff_rate - 200.0 / 3.0).abs() < 1e-9);
        // Empty step after step 2
        assert_eq!(snap.funnel[3].dropoff, 1);
        assert_eq!(snap.funnel[4].dropoff_rate, 0.0);
    }

    #[test]
    fn test_funnel_step_zero_falls_back_to_sessions() {
        let events = vec![
            ev("1", "A", EventType::StepView, 1, 0),
            ev("2", "B", EventType::StepView, 1, 0),
        ];
        let snap = dashboard(&events);
        assert_eq!(snap.funnel[0].users, 2);
        assert_eq!(snap.funnel[1].users, 2);
        assert_eq!(snap.funnel[1].dropoff, 0);
    }

    #[test]
    fn test_time_series_by_date() {
        let events = vec![
            ev("1", "A", EventType::QuizStart, 0, DAY + 10),
            ev("2", "A", EventType::QuizComplete, 18, DAY + 20),
            ev("3", "B", EventType::QuizStart, 0, 10),
            ev("4", "B", EventType::StepView, 1, 20),
        ];
        let snap = dashboard(&events);
        assert_eq!(
            snap.time_series_data,
            vec![
                TimeSeriesPoint {
                    date: "1970-01-01".to_string(),
                    sessions: 1,
                    completions: 0
                },
                TimeSeriesPoint {
                    date: "1970-01-02".to_string(),
                    sessions: 1,
                    completions: 1
                },
            ]
        );
    }

    #[test]
    fn test_time_series_follows_zone() {
        // 01:00 UTC on Jan 2 is still Jan 1 at UTC-3
        let events = vec![ev("1", "A", EventType::QuizStart, 0, DAY + 3600 * 1000)];
        let options = AggregateOptions {
            zone: ZonePolicy::from_offset_minutes(-180).unwrap(),
            ..Default::default()
        };
        let snap = compute_dashboard(&events, &StepCatalog::reference(), &options);
        assert_eq!(snap.time_series_data[0].date, "1970-01-01");
    }

    #[test]
    fn test_recent_events_newest_first_and_limited() {
        let events: Vec<Event> = (0..60)
            .map(|i| ev(&i.to_string(), "A", EventType::StepView, 1, i))
            .collect();
        let snap = dashboard(&events);
        assert_eq!(snap.recent_events.len(), 50);
        assert_eq!(snap.recent_events[0].timestamp, 59);
        assert_eq!(snap.recent_events[49].timestamp, 10);
    }

    #[test]
    fn test_date_filter_applies_everywhere() {
        let events = vec![
            ev("1", "A", EventType::QuizStart, 0, 100),
            ev("2", "A", EventType::QuizComplete, 18, 200),
            ev("3", "B", EventType::QuizStart, 0, 5 * DAY),
            ev("4", "B", EventType::StepView, 1, 5 * DAY + 1),
        ];
        let options = AggregateOptions {
            range: Some(DateRange::new(4 * DAY, 6 * DAY).unwrap()),
            ..Default::default()
        };
        let snap = compute_dashboard(&events, &StepCatalog::reference(), &options);

        assert_eq!(snap.total_sessions, 1);
        assert_eq!(snap.completed_sessions, 0);
        assert_eq!(snap.total_events, 2);
        assert_eq!(snap.funnel[0].users, 1);
        assert_eq!(snap.step_stats[1].views, 1);
        assert_eq!(snap.time_series_data.len(), 1);
        assert_eq!(snap.time_series_data[0].date, "1970-01-06");
        assert!(snap.recent_events.iter().all(|e| e.session_id == "B"));
    }

    #[test]
    fn test_duplicate_ids_count_once() {
        let events = vec![
            ev("1", "A", EventType::StepView, 1, 0),
            ev("1", "A", EventType::StepView, 1, 0),
        ];
        let snap = dashboard(&events);
        assert_eq!(snap.step_stats[1].views, 1);
        assert_eq!(snap.total_events, 1);
    }

    #[test]
    fn test_snapshot_wire_names() {
        let json = serde_json::to_value(dashboard(&[])).unwrap();
        assert!(json.get("totalSessions").is_some());
        assert!(json.get("avgCompletionTime").is_some());
        assert!(json.get("timeSeriesData").is_some());
        assert!(json["stepStats"][0].get("abandonRate").is_some());
        assert!(json["funnel"][0].get("dropoffRate").is_some());
    }
}
