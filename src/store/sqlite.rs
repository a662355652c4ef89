//! SQLite event backend
//!
//! Persistent local event log. Rows carry an AUTOINCREMENT sequence so the
//! FIFO cap evicts strictly by insertion order, independent of the event's
//! own (possibly out-of-order) timestamp.

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::events::{DateRange, Event, EventType, Metadata, StoreError, StoreResult};
use crate::store::backend::{BackendKind, EventBackend};

const SELECT_COLUMNS: &str = "id, session_id, event_type, step, step_name, answer, \
     answer_index, timestamp, time_spent_on_step, metadata";

/// SQLite-backed bounded event log
pub struct SqliteBackend {
    /// std::sync::Mutex because rusqlite::Connection is !Sync
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    cap: Option<usize>,
}

impl SqliteBackend {
    /// Create or open `events.db` inside `data_dir`
    pub fn open(data_dir: &Path, cap: Option<usize>) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("events.db");

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let backend = Self {
            conn: Mutex::new(conn),
            path: Some(path),
            cap,
        };
        backend.init_schema()?;

        tracing::info!(path = ?backend.path, cap = ?cap, "Opened SQLite event store");
        Ok(backend)
    }

    /// Non-persistent database, handy for tests and one-off reports
    pub fn in_memory(cap: Option<usize>) -> StoreResult<Self> {
        let backend = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
            cap,
        };
        backend.init_schema()?;
        Ok(backend)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                step INTEGER NOT NULL,
                step_name TEXT NOT NULL,
                answer TEXT,
                answer_index INTEGER,
                timestamp INTEGER NOT NULL,
                time_spent_on_step INTEGER,
                metadata TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire SQLite lock: {}", e)))
    }

    fn row_to_event(row: &Row<'_>) -> rusqlite::Result<(Event, Option<String>)> {
        let event_type: String = row.get(2)?;
        let event_type = event_type.parse::<EventType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let event = Event {
            id: row.get(0)?,
            session_id: row.get(1)?,
            event_type,
            step: row.get(3)?,
            step_name: row.get(4)?,
            answer: row.get(5)?,
            answer_index: row.get(6)?,
            timestamp: row.get(7)?,
            time_spent_on_step: row.get(8)?,
            metadata: None,
        };
        let metadata: Option<String> = row.get(9)?;
        Ok((event, metadata))
    }
}

#[async_trait]
impl EventBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn append(&self, event: &Event) -> StoreResult<usize> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO events (id, session_id, event_type, step, step_name, answer,
                                 answer_index, timestamp, time_spent_on_step, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.id,
                event.session_id,
                event.event_type.as_str(),
                event.step,
                event.step_name,
                event.answer,
                event.answer_index,
                event.timestamp,
                event.time_spent_on_step,
                metadata,
            ],
        )?;

        let evicted = match self.cap {
            Some(cap) => tx.execute(
                "DELETE FROM events WHERE seq NOT IN
                    (SELECT seq FROM events ORDER BY seq DESC LIMIT ?1)",
                params![cap as i64],
            )?,
            None => 0,
        };

        tx.commit()?;
        Ok(evicted)
    }

    async fn fetch(&self, range: Option<&DateRange>) -> StoreResult<Vec<Event>> {
        let range = range.copied().unwrap_or_else(DateRange::unbounded);
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM events WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY seq",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![range.start, range.end], Self::row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            let (mut event, metadata) = row?;
            if let Some(raw) = metadata {
                event.metadata = Some(serde_json::from_str::<Metadata>(&raw)?);
            }
            events.push(event);
        }
        Ok(events)
    }

    async fn len(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
