//! Storage port
//!
//! `EventBackend` is the seam between the store adapter and wherever events
//! actually live. `MemoryBackend` is the in-process implementation used when
//! no persistent local storage is available.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::events::{in_range, DateRange, Event, StoreResult};

/// Where a backend keeps its events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-process or on-device storage
    Local,
    /// Network-reachable event table
    Remote,
}

/// Common trait for all event backends
#[async_trait]
pub trait EventBackend: Send + Sync {
    /// Unique name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Local or remote
    fn kind(&self) -> BackendKind;

    /// Append one event; returns how many old events were evicted by the cap
    async fn append(&self, event: &Event) -> StoreResult<usize>;

    /// Events in insertion order, optionally restricted to a date range
    async fn fetch(&self, range: Option<&DateRange>) -> StoreResult<Vec<Event>>;

    /// Number of stored events
    async fn len(&self) -> StoreResult<usize>;
}

/// Drop the oldest entries until the log is at or under `cap`
pub(crate) fn evict_overflow<T>(log: &mut VecDeque<T>, cap: Option<usize>) -> usize {
    let Some(cap) = cap else {
        return 0;
    };
    let overflow = log.len().saturating_sub(cap);
    log.drain(..overflow);
    overflow
}

/// Bounded FIFO event log kept in process memory
pub struct MemoryBackend {
    name: String,
    kind: BackendKind,
    cap: Option<usize>,
    log: RwLock<VecDeque<Event>>,
}

impl MemoryBackend {
    /// Create a local in-memory backend retaining at most `cap` events
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            name: "memory".to_string(),
            kind: BackendKind::Local,
            cap,
            log: RwLock::new(VecDeque::new()),
        }
    }

    /// Builder: set the backend name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: set the backend kind
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }
}

#[async_trait]
impl EventBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn append(&self, event: &Event) -> StoreResult<usize> {
        // Push and evict under one write lock so racing appends never
        // observe a log above the cap.
        let mut log = self.log.write().await;
        log.push_back(event.clone());
        Ok(evict_overflow(&mut log, self.cap))
    }

    async fn fetch(&self, range: Option<&DateRange>) -> StoreResult<Vec<Event>> {
        let log = self.log.read().await;
        Ok(log
            .iter()
            .filter(|e| in_range(range, e.timestamp))
            .cloned()
            .collect())
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.log.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use std::sync::Arc;

    fn event(id: &str, ts: i64) -> Event {
        Event::new("s1", EventType::StepView, 1, ts).with_id(id)
    }

    #[test]
    fn test_evict_overflow() {
        let mut log: VecDeque<u32> = (0..5).collect();
        assert_eq!(evict_overflow(&mut log, Some(3)), 2);
        assert_eq!(log, VecDeque::from(vec![2, 3, 4]));
        assert_eq!(evict_overflow(&mut log, None), 0);
        assert_eq!(evict_overflow(&mut log, Some(10)), 0);
    }

    #[tokio::test]
    async fn test_cap_keeps_last_by_insertion_order() {
        let backend = MemoryBackend::new(Some(3));
        for i in 0..5 {
            backend.append(&event(&format!("e{}", i), 100 - i)).await.unwrap();
        }

        let ids: Vec<String> = backend
            .fetch(None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e2", "e3", "e4"]);
    }

    #[tokio::test]
    async fn test_fetch_with_range() {
        let backend = MemoryBackend::new(None);
        for ts in [100, 200, 300] {
            backend.append(&event(&ts.to_string(), ts)).await.unwrap();
        }
        let range = DateRange::new(150, 300).unwrap();
        let events = backend.fetch(Some(&range)).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, 200);
    }

    #[tokio::test]
    async fn test_concurrent_appends_respect_cap() {
        let backend = Arc::new(MemoryBackend::new(Some(50)));
        let mut handles = Vec::new();

        for task in 0..8 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                for i in 0..40 {
                    let e = Event::new(format!("s{}", task), EventType::StepView, 1, i)
                        .with_id(format!("{}-{}", task, i));
                    backend.append(&e).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(backend.len().await.unwrap(), 50);
    }
}
