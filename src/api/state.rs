//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::analytics::AggregateOptions;
use crate::config::{ApiConfig, Config, ConfigError};
use crate::events::{StepCatalog, ZonePolicy};
use crate::store::{Clock, EventStore};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Merged event store (primary plus replicas)
    pub store: Arc<EventStore>,
    /// Step catalog used for names and per-step layout
    pub catalog: Arc<StepCatalog>,
    /// Zone for calendar dates, hours and date-only bounds
    pub zone: ZonePolicy,
    /// Length of the recent-event feed
    pub recent_limit: usize,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state with the reference catalog and UTC
    pub fn new(store: Arc<EventStore>, config: ApiConfig) -> Self {
        let defaults = AggregateOptions::default();
        Self {
            store,
            catalog: Arc::new(StepCatalog::reference()),
            zone: defaults.zone,
            recent_limit: defaults.recent_limit,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Create state from the full configuration
    pub fn from_config(store: Arc<EventStore>, config: &Config) -> Result<Self, ConfigError> {
        let mut state = Self::new(store, config.api.clone());
        state.catalog = Arc::new(config.analytics.catalog());
        state.zone = config.analytics.zone()?;
        state.recent_limit = config.analytics.recent_limit;
        Ok(state)
    }

    /// Builder: replace the step catalog
    pub fn with_catalog(mut self, catalog: StepCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Builder: set the zone policy
    pub fn with_zone(mut self, zone: ZonePolicy) -> Self {
        self.zone = zone;
        self
    }

    /// Current time from the store's clock
    pub fn now(&self) -> i64 {
        self.clock().now_millis()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.store.clock()
    }

    /// Aggregation options with this server's zone and feed length, no range yet
    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            range: None,
            zone: self.zone,
            recent_limit: self.recent_limit,
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
