//! Advanced Metrics Module
//!
//! Behavioral metrics layered on the same reconstructed sessions as the
//! dashboard: session duration, where sessions stopped, device mix, hourly
//! activity, per-step dwell time and the engagement score.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::analytics::dashboard::dwell_seconds;
use crate::analytics::session::{distinct_events, group_sessions};
use crate::analytics::{mean, percent, AggregateOptions};
use crate::events::{Event, StepCatalog};

/// Screens narrower than this are mobile
pub const MOBILE_MAX_WIDTH: f64 = 768.0;

/// Sessions whose furthest step was `step`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropoffPoint {
    pub step: u32,
    pub step_name: String,
    pub sessions: u64,
}

/// Mean dwell time at one step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDwell {
    pub step: u32,
    pub step_name: String,
    /// Seconds
    pub avg_time_spent: f64,
    pub samples: u64,
}

/// Sessions by device class of their first event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBreakdown {
    pub mobile: u64,
    pub desktop: u64,
    /// Sessions without a usable `screenWidth`; not part of either bucket
    pub unknown: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub hour: u32,
    pub sessions: u64,
}

/// Derived behavioral metrics for a date range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedMetrics {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub completion_rate: f64,
    /// Mean first-to-last event span, in seconds
    pub avg_session_duration: f64,
    /// Furthest-step histogram, most common first
    pub dropoff_points: Vec<DropoffPoint>,
    pub avg_time_per_step: Vec<StepDwell>,
    pub device_breakdown: DeviceBreakdown,
    /// Always 24 buckets, hour 0 first
    pub hourly_activity: Vec<HourlyBucket>,
    /// Heuristic in [0, 100]
    pub engagement_score: u32,
    pub total_events: u64,
    pub events_per_session: f64,
}

/// Compute advanced metrics for `events` inside `options.range`
pub fn compute_advanced(
    events: &[Event],
    catalog: &StepCatalog,
    options: &AggregateOptions,
) -> AdvancedMetrics {
    let events = distinct_events(events, options.range.as_ref());
    let sessions = group_sessions(&events);
    let total_sessions = sessions.len() as u64;

    let mut completed = 0u64;
    let mut durations = Vec::with_capacity(sessions.len());
    let mut max_steps: BTreeMap<u32, u64> = BTreeMap::new();
    let mut devices = DeviceBreakdown::default();
    let mut hourly = [0u64; 24];

    for session in sessions.values() {
        if session.is_completed() {
            completed += 1;
        }
        durations.push(session.duration_secs());
        *max_steps.entry(session.max_step()).or_insert(0) += 1;

        let Some(first) = session.first() else {
            continue;
        };
        match first.screen_width() {
            Some(width) if width < MOBILE_MAX_WIDTH => devices.mobile += 1,
            Some(_) => devices.desktop += 1,
            None => devices.unknown += 1,
        }
        hourly[options.zone.hour_of(first.timestamp) as usize % 24] += 1;
    }

    let completion_rate = percent(completed, total_sessions);
    let avg_session_duration = mean(&durations);

    AdvancedMetrics {
        total_sessions,
        completed_sessions: completed,
        completion_rate,
        avg_session_duration,
        dropoff_points: dropoff_points(max_steps, catalog),
        avg_time_per_step: avg_time_per_step(&events, catalog),
        device_breakdown: devices,
        hourly_activity: hourly
            .iter()
            .enumerate()
            .map(|(hour, sessions)| HourlyBucket {
                hour: hour as u32,
                sessions: *sessions,
            })
            .collect(),
        engagement_score: engagement_score(total_sessions, completion_rate, avg_session_duration),
        total_events: events.len() as u64,
        events_per_session: if total_sessions > 0 {
            events.len() as f64 / total_sessions as f64
        } else {
            0.0
        },
    }
}

/// `min(100, round(completionRate + avgSessionMinutes * 5))`, 0 without sessions
pub fn engagement_score(total_sessions: u64, completion_rate: f64, avg_duration_secs: f64) -> u32 {
    if total_sessions == 0 {
        return 0;
    }
    let raw = (completion_rate + (avg_duration_secs / 60.0) * 5.0).round();
    raw.clamp(0.0, 100.0) as u32
}

fn dropoff_points(max_steps: BTreeMap<u32, u64>, catalog: &StepCatalog) -> Vec<DropoffPoint> {
    let mut points: Vec<DropoffPoint> = max_steps
        .into_iter()
        .filter(|(_, sessions)| *sessions > 0)
        .map(|(step, sessions)| DropoffPoint {
            step,
            step_name: catalog.name_for(step),
            sessions,
        })
        .collect();
    // BTreeMap order makes the stable sort break ties by ascending step
    points.sort_by(|a, b| b.sessions.cmp(&a.sessions));
    points
}

fn avg_time_per_step(events: &[&Event], catalog: &StepCatalog) -> Vec<StepDwell> {
    let mut totals: BTreeMap<u32, (i64, u64)> = BTreeMap::new();
    for event in events {
        if let Some(ms) = event.positive_time_spent() {
            let slot = totals.entry(event.step).or_default();
            slot.0 = slot.0.saturating_add(ms);
            slot.1 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(step, (total_ms, samples))| StepDwell {
            step,
            step_name: catalog.name_for(step),
            avg_time_spent: dwell_seconds(total_ms, samples),
            samples,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::compute_dashboard;
    use crate::events::{DateRange, EventType, ZonePolicy};

    const HOUR: i64 = 3600 * 1000;

    fn ev(id: &str, session: &str, event_type: EventType, step: u32, ts: i64) -> Event {
        Event::new(session, event_type, step, ts).with_id(id)
    }

    fn advanced(events: &[Event]) -> AdvancedMetrics {
        compute_advanced(events, &StepCatalog::reference(), &AggregateOptions::default())
    }

    fn fixture() -> Vec<Event> {
        vec![
            // A: mobile, completed, 10 minutes, starts 09:00
            ev("a1", "A", EventType::QuizStart, 0, 9 * HOUR).meta("screenWidth", 390),
            ev("a2", "A", EventType::StepView, 1, 9 * HOUR + 1000).time_spent(1000),
            ev("a3", "A", EventType::QuizComplete, 18, 9 * HOUR + 600_000),
            // B: desktop, stops at step 3, starts 14:00
            ev("b1", "B", EventType::QuizStart, 0, 14 * HOUR).meta("screenWidth", "1440"),
            ev("b2", "B", EventType::StepView, 1, 14 * HOUR + 2000).time_spent(3000),
            ev("b3", "B", EventType::StepView, 3, 14 * HOUR + 5000).time_spent(2500),
            // C: no metadata, single event at step 3
            ev("c1", "C", EventType::StepView, 3, 14 * HOUR + 30),
        ]
    }

    #[test]
    fn test_counts_and_duration() {
        let m = advanced(&fixture());
        assert_eq!(m.total_sessions, 3);
        assert_eq!(m.completed_sessions, 1);
        assert_eq!(m.total_events, 7);
        assert!((m.events_per_session - 7.0 / 3.0).abs() < 1e-9);
        // (600 + 5 + 0) / 3
        assert!((m.avg_session_duration - 605.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dropoff_points_sorted_by_count_then_step() {
        let m = advanced(&fixture());
        let points: Vec<(u32, u64)> = m.dropoff_points.iter().map(|p| (p.step, p.sessions)).collect();
        assert_eq!(points, vec![(3, 2), (18, 1)]);
        assert_eq!(m.dropoff_points[0].step_name, "Zona reducir grasa");
    }

    #[test]
    fn test_device_breakdown_excludes_missing_width() {
        let m = advanced(&fixture());
        assert_eq!(m.device_breakdown.mobile, 1);
        assert_eq!(m.device_breakdown.desktop, 1);
        assert_eq!(m.device_breakdown.unknown, 1);
    }

    #[test]
    fn test_hourly_activity_has_all_buckets() {
        let m = advanced(&fixture());
        assert_eq!(m.hourly_activity.len(), 24);
        assert_eq!(m.hourly_activity[9].sessions, 1);
        assert_eq!(m.hourly_activity[14].sessions, 2);
        assert_eq!(m.hourly_activity.iter().map(|b| b.sessions).sum::<u64>(), 3);

        let empty = advanced(&[]);
        assert_eq!(empty.hourly_activity.len(), 24);
    }

    #[test]
    fn test_hourly_activity_follows_zone() {
        let options = AggregateOptions {
            zone: ZonePolicy::from_offset_minutes(-180).unwrap(),
            ..Default::default()
        };
        let m = compute_advanced(&fixture(), &StepCatalog::reference(), &options);
        assert_eq!(m.hourly_activity[6].sessions, 1);
        assert_eq!(m.hourly_activity[11].sessions, 2);
    }

    #[test]
    fn test_engagement_score() {
        let m = advanced(&fixture());
        // 33.33 + (201.67 / 60) * 5 = 50.14
        assert_eq!(m.engagement_score, 50);

        assert_eq!(engagement_score(0, 0.0, 0.0), 0);
        assert_eq!(engagement_score(1, 100.0, 600.0), 100);
        assert_eq!(advanced(&[]).engagement_score, 0);
    }

    #[test]
    fn test_dwell_time_matches_step_stats() {
        let events = fixture();
        let catalog = StepCatalog::reference();
        let options = AggregateOptions::default();
        let snapshot = compute_dashboard(&events, &catalog, &options);
        let metrics = compute_advanced(&events, &catalog, &options);

        assert!(!metrics.avg_time_per_step.is_empty());
        for dwell in &metrics.avg_time_per_step {
            let stats = &snapshot.step_stats[dwell.step as usize];
            assert!((stats.avg_time_spent - dwell.avg_time_spent).abs() < 1e-9);
        }
        assert_eq!(metrics.avg_time_per_step[0].step, 1);
        assert_eq!(metrics.avg_time_per_step[0].avg_time_spent, 2.0);
    }

    #[test]
    fn test_range_restricts_sessions() {
        let options = AggregateOptions {
            range: Some(DateRange::new(13 * HOUR, 15 * HOUR).unwrap()),
            ..Default::default()
        };
        let m = compute_advanced(&fixture(), &StepCatalog::reference(), &options);
        assert_eq!(m.total_sessions, 2);
        assert_eq!(m.completed_sessions, 0);
        assert_eq!(m.hourly_activity[9].sessions, 0);
    }

    #[test]
    fn test_extreme_values_stay_total() {
        let events = vec![
            ev("x1", "X", EventType::QuizStart, 0, i64::MIN + 1),
            ev("x2", "X", EventType::StepView, 1, 0).time_spent(i64::MAX),
            ev("x3", "X", EventType::StepView, 1, 1).time_spent(i64::MAX),
            ev("x4", "X", EventType::QuizComplete, 18, i64::MAX),
        ];

        let m = advanced(&events);
        assert_eq!(m.total_sessions, 1);
        assert!(m.avg_session_duration.is_finite());
        assert!(m.avg_time_per_step.iter().all(|d| d.avg_time_spent.is_finite()));
        assert!(m.engagement_score <= 100);

        let snap = compute_dashboard(&events, &StepCatalog::reference(), &AggregateOptions::default());
        assert_eq!(snap.completed_sessions, 1);
        assert!(snap.avg_completion_time > 0.0);
    }
}
