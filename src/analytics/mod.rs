//! Quiz Funnel Analytics
//!
//! Stateless aggregation over a full event collection. Every call
//! re-derives its result from the events it is given.
//!
//! - **session**: Groups events into per-session timelines
//! - **dashboard**: Step statistics, funnel, answers, time series
//! - **advanced**: Duration, devices, hourly activity, engagement
//!
//! # Example
//!
//! ```rust
//! use quizpulse::analytics::{compute_dashboard, AggregateOptions};
//! use quizpulse::events::{Event, EventType, StepCatalog};
//!
//! let events = vec![
//!     Event::new("A", EventType::QuizStart, 0, 0),
//!     Event::new("A", EventType::StepView, 1, 1_000),
//!     Event::new("A", EventType::QuizComplete, 18, 5_000),
//! ];
//! let snapshot = compute_dashboard(&events, &StepCatalog::reference(), &AggregateOptions::default());
//!
//! assert_eq!(snapshot.completion_rate, 100.0);
//! assert_eq!(snapshot.avg_completion_time, 5.0);
//! ```

pub mod advanced;
pub mod dashboard;
pub mod session;

pub use advanced::{
    compute_advanced, engagement_score, AdvancedMetrics, DeviceBreakdown, DropoffPoint,
    HourlyBucket, StepDwell, MOBILE_MAX_WIDTH,
};
pub use dashboard::{compute_dashboard, DashboardSnapshot, FunnelStep, StepStats, TimeSeriesPoint};
pub use session::{distinct_events, group_sessions, reconstruct, Session, SessionOutcome};

use crate::events::{DateRange, ZonePolicy};

/// Default length of the recent-event feed
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// Inputs shared by every aggregation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Inclusive filter applied before anything else; `None` keeps all events
    pub range: Option<DateRange>,
    /// Zone for calendar dates and hours of day
    pub zone: ZonePolicy,
    pub recent_limit: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            range: None,
            zone: ZonePolicy::utc(),
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

impl AggregateOptions {
    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }
}

/// `part / whole * 100`, 0 when `whole` is 0
pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
