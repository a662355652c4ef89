//! Event Store
//!
//! Append, cap-and-evict and merged retrieval of quiz events:
//!
//! - **backend**: The `EventBackend` storage port and the in-memory backend
//! - **sqlite**: Persistent local backend
//! - **remote**: Remote event table over HTTP
//! - **adapter**: `EventStore`, merging and de-duplicating across backends
//! - **clock**: The `Clock` port
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Event → validate → primary (FIFO cap) → replicas (timeout, best effort)
//!
//! Read Path:
//!   fetch(range) → primary + replicas → merge → dedup by id → range → FetchOutcome
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use quizpulse::events::{Event, EventType};
//! use quizpulse::store::{EventStore, MemoryBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EventStore::new(Arc::new(MemoryBackend::new(Some(10_000))));
//!
//!     store.append(Event::new("session-1", EventType::QuizStart, 0, 0)).await?;
//!
//!     let events = store.fetch_all(None).await;
//!     println!("{} events", events.len());
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod backend;
pub mod clock;
pub mod remote;
pub mod sqlite;

// Re-export commonly used types
pub use adapter::{
    merge_dedup, AppendReceipt, BackendFailure, BackendStats, BatchReport, DataSource,
    EventStore, FetchOutcome, Operation, DEFAULT_REPLICA_TIMEOUT_MS,
};
pub use backend::{BackendKind, EventBackend, MemoryBackend};
pub use clock::{Clock, FixedClock, SystemClock};
pub use remote::{RemoteBackend, RemoteConfig, RemoteEventRow};
pub use sqlite::SqliteBackend;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, StoreBackend};
use crate::events::StoreResult;

/// Build the store described by the configuration
pub fn open_store(config: &Config, clock: Arc<dyn Clock>) -> StoreResult<EventStore> {
    let cap = config.store.cap();
    let primary: Arc<dyn EventBackend> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryBackend::new(cap)),
        StoreBackend::Sqlite => Arc::new(SqliteBackend::open(&config.store.data_path(), cap)?),
    };

    let mut store = EventStore::new(primary)
        .with_clock(clock)
        .replica_timeout(Duration::from_millis(config.store.replica_timeout_ms));

    if let Some(remote) = config.remote.client_config() {
        tracing::info!(url = %remote.base_url, table = %remote.table, "Mirroring events to remote table");
        store = store.with_replica(Arc::new(RemoteBackend::new(remote)?));
    }

    Ok(store)
}
