//! # QuizPulse
//!
//! Quiz funnel analytics: collects interaction events from a multi-step
//! quiz, reconstructs sessions and aggregates them into funnel, drop-off
//! and engagement metrics for a dashboard.
//!
//! ## Features
//!
//! - **Capped event store**: Local primary (SQLite or memory) with FIFO eviction
//! - **Replication**: Best-effort mirror to a remote event table, merged on read
//! - **Session reconstruction**: Order-independent, de-duplicated by event id
//! - **Aggregation**: Step stats, funnel, answer distribution, time series,
//!   drop-off points, device split, hourly activity and engagement score
//! - **REST API**: Axum server with a shared-secret gate on the read endpoints
//!
//! ## Modules
//!
//! - [`events`]: Event model, step catalog and date ranges
//! - [`store`]: Storage backends and the merging `EventStore`
//! - [`analytics`]: Session reconstruction and aggregation
//! - [`tracker`]: Producer-side session tracking
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizpulse::analytics::{compute_dashboard, AggregateOptions};
//! use quizpulse::events::{DateRange, Event, EventType, StepCatalog};
//! use quizpulse::store::{EventStore, MemoryBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EventStore::new(Arc::new(MemoryBackend::new(Some(10_000))));
//!
//!     store.append(Event::new("session-1", EventType::QuizStart, 0, 1_700_000_000_000)).await?;
//!     store.append(Event::new("session-1", EventType::StepView, 1, 1_700_000_004_000)).await?;
//!
//!     // Last 7 days
//!     let range = DateRange::last_days(1_700_000_010_000, 7);
//!     let events = store.fetch_all(Some(range)).await;
//!
//!     let snapshot = compute_dashboard(
//!         &events,
//!         &StepCatalog::reference(),
//!         &AggregateOptions::default().with_range(Some(range)),
//!     );
//!     println!("{} sessions, {:.1}% completed", snapshot.total_sessions, snapshot.completion_rate);
//!
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod api;
pub mod config;
pub mod events;
pub mod logging;
pub mod store;
pub mod tracker;

// Re-export top-level types for convenience
pub use events::{
    DateRange, Event, EventType, Metadata, RangeError, StepCatalog, StoreError, StoreResult,
    ZonePolicy,
};

pub use store::{Clock, EventBackend, EventStore, FetchOutcome, MemoryBackend, SqliteBackend};

pub use analytics::{
    compute_advanced, compute_dashboard, AdvancedMetrics, AggregateOptions, DashboardSnapshot,
};

pub use tracker::{ClientInfo, SessionTracker};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{ApiConfig, Config, ConfigError};
