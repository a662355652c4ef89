//! Event Store Adapter
//!
//! Orchestrates the configured backends:
//! - Write path: validate → primary (capped, errors surface) → replicas (bounded, errors reported)
//! - Read path: primary + replicas → merge → de-duplicate by id → range filter
//!
//! Reads never fail: an unreachable backend degrades the result to whatever
//! the others returned, and the failure goes to the diagnostics channel.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

use crate::events::{in_range, DateRange, Event, StoreResult};
use crate::store::backend::{BackendKind, EventBackend};
use crate::store::clock::{Clock, SystemClock};

/// Default bound on any replica round-trip
pub const DEFAULT_REPLICA_TIMEOUT_MS: u64 = 5000;

const DIAGNOSTICS_CAPACITY: usize = 256;

/// Operation during which a backend failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Append,
    Fetch,
}

/// A non-fatal backend failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendFailure {
    pub backend: String,
    pub operation: Operation,
    pub reason: String,
    /// When the failure was observed (epoch ms)
    pub at: i64,
}

/// Which kinds of backend contributed to a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Local,
    Remote,
    Mixed,
}

impl DataSource {
    fn from_counts(local: usize, remote: usize) -> Self {
        match (local > 0, remote > 0) {
            (true, true) => DataSource::Mixed,
            (false, true) => DataSource::Remote,
            _ => DataSource::Local,
        }
    }
}

/// Result of a merged read
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// De-duplicated events
    pub events: Vec<Event>,
    /// Which kinds of backend contributed
    pub source: DataSource,
    /// Backends that could not be read
    pub failures: Vec<BackendFailure>,
}

/// Acknowledgement of an accepted event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub event_id: String,
    /// Old events dropped by the primary's cap
    pub evicted: usize,
}

/// Outcome of a batch append
#[derive(Debug, Default)]
pub struct BatchReport {
    pub accepted: usize,
    /// (index in batch, error message)
    pub errors: Vec<(usize, String)>,
}

/// Per-backend counters for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct BackendStats {
    pub name: String,
    pub remote: bool,
    /// Stored events; `None` for remote backends or on error
    pub events: Option<usize>,
}

/// Merge events from several sources keeping one record per id.
///
/// Later occurrences replace the value of earlier ones while the record
/// keeps its first-seen position, so the result is deterministic for a
/// given input order.
pub fn merge_dedup<I>(events: I) -> Vec<Event>
where
    I: IntoIterator<Item = Event>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Event> = Vec::new();

    for event in events {
        match positions.get(&event.id) {
            Some(&idx) => merged[idx] = event,
            None => {
                positions.insert(event.id.clone(), merged.len());
                merged.push(event);
            }
        }
    }

    merged
}

/// Event store adapter over one primary and any number of replicas
pub struct EventStore {
    primary: Arc<dyn EventBackend>,
    replicas: Vec<Arc<dyn EventBackend>>,
    clock: Arc<dyn Clock>,
    replica_timeout: Duration,
    diagnostics: broadcast::Sender<BackendFailure>,
}

impl EventStore {
    /// Create a store writing to `primary`
    pub fn new(primary: Arc<dyn EventBackend>) -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self {
            primary,
            replicas: Vec::new(),
            clock: Arc::new(SystemClock),
            replica_timeout: Duration::from_millis(DEFAULT_REPLICA_TIMEOUT_MS),
            diagnostics,
        }
    }

    /// Builder: mirror writes to and merge reads from another backend
    pub fn with_replica(mut self, backend: Arc<dyn EventBackend>) -> Self {
        self.replicas.push(backend);
        self
    }

    /// Builder: inject the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder: bound replica round-trips
    pub fn replica_timeout(mut self, timeout: Duration) -> Self {
        self.replica_timeout = timeout;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Subscribe to non-fatal backend failures
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<BackendFailure> {
        self.diagnostics.subscribe()
    }

    fn report(&self, backend: &str, operation: Operation, reason: String) -> BackendFailure {
        let failure = BackendFailure {
            backend: backend.to_string(),
            operation,
            reason,
            at: self.clock.now_millis(),
        };

        tracing::warn!(
            backend = %failure.backend,
            operation = ?failure.operation,
            reason = %failure.reason,
            "Event backend failure, continuing with remaining data"
        );

        // No subscribers is fine
        let _ = self.diagnostics.send(failure.clone());
        failure
    }

    /// Validate and store one event.
    ///
    /// Nothing is written when validation fails. Primary failures are
    /// returned; replica failures are only reported.
    pub async fn append(&self, event: Event) -> StoreResult<AppendReceipt> {
        event.validate()?;

        let evicted = self.primary.append(&event).await?;
        if evicted > 0 {
            tracing::debug!(
                backend = %self.primary.name(),
                evicted,
                "Evicted oldest events over cap"
            );
        }

        for replica in &self.replicas {
            match timeout(self.replica_timeout, replica.append(&event)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.report(replica.name(), Operation::Append, e.to_string());
                }
                Err(_) => {
                    self.report(
                        replica.name(),
                        Operation::Append,
                        format!("timed out after {} ms", self.replica_timeout.as_millis()),
                    );
                }
            }
        }

        Ok(AppendReceipt {
            event_id: event.id,
            evicted,
        })
    }

    /// Store many events, collecting per-index failures
    pub async fn append_batch(&self, events: Vec<Event>) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, event) in events.into_iter().enumerate() {
            match self.append(event).await {
                Ok(_) => report.accepted += 1,
                Err(e) => report.errors.push((index, e.to_string())),
            }
        }
        report
    }

    /// Read every backend and merge, de-duplicating by id.
    ///
    /// Merge order is the primary first, then replicas in registration
    /// order, so a replica's copy of an id wins over the primary's. The
    /// range applies to the merged winners, never to individual copies.
    pub async fn fetch(&self, range: Option<DateRange>) -> FetchOutcome {
        let mut failures = Vec::new();
        let mut local_count = 0;
        let mut remote_count = 0;
        let mut gathered: Vec<Event> = Vec::new();

        let backends = std::iter::once(&self.primary).chain(self.replicas.iter());
        for backend in backends {
            let result = timeout(self.replica_timeout, backend.fetch(None)).await;
            let events = match result {
                Ok(Ok(events)) => events,
                Ok(Err(e)) => {
                    failures.push(self.report(backend.name(), Operation::Fetch, e.to_string()));
                    continue;
                }
                Err(_) => {
                    failures.push(self.report(
                        backend.name(),
                        Operation::Fetch,
                        format!("timed out after {} ms", self.replica_timeout.as_millis()),
                    ));
                    continue;
                }
            };

            let contributed = events
                .iter()
                .filter(|e| in_range(range.as_ref(), e.timestamp))
                .count();
            match backend.kind() {
                BackendKind::Local => local_count += contributed,
                BackendKind::Remote => remote_count += contributed,
            }
            gathered.extend(events);
        }

        let mut events = merge_dedup(gathered);
        events.retain(|e| in_range(range.as_ref(), e.timestamp));
        tracing::debug!(
            events = events.len(),
            local = local_count,
            remote = remote_count,
            "Fetched events"
        );

        FetchOutcome {
            events,
            source: DataSource::from_counts(local_count, remote_count),
            failures,
        }
    }

    /// Merged, de-duplicated events within an optional inclusive range
    pub async fn fetch_all(&self, range: Option<DateRange>) -> Vec<Event> {
        self.fetch(range).await.events
    }

    /// Event counts for local backends
    pub async fn stats(&self) -> Vec<BackendStats> {
        let mut stats = Vec::new();
        for backend in std::iter::once(&self.primary).chain(self.replicas.iter()) {
            let remote = backend.kind() == BackendKind::Remote;
            let events = if remote {
                None
            } else {
                backend.len().await.ok()
            };
            stats.push(BackendStats {
                name: backend.name().to_string(),
                remote,
                events,
            });
        }
        stats
    }
}
