#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Store SQLite Driver
//!
//! Durable event store implementing the [`EventStore`] port on a single
//! SQLite `events` table.
//!
//! - timestamps are stored as integer microseconds since the Unix epoch
//! - metadata is stored as compact JSON text
//! - every filterable column is indexed, plus `(event_type, occurred_at)`
//! - the schema is versioned in `opsline_schema_migrations`
//!
//! The connection sits behind a mutex; inserts are single-row statements
//! and deletes are single batch statements.
//!
//! # Examples
//!
//! ```rust
//! use opsline_core::NewEvent;
//! use opsline_ports::EventStore;
//! use opsline_store_sqlite::SqliteEventStore;
//!
//! # fn main() -> Result<(), opsline_ports::StoreError> {
//! let store = SqliteEventStore::open_in_memory()?;
//! let id = store.insert(NewEvent::new("cable.broadcast", "chat_1"))?;
//! assert_eq!(store.fetch(id)?.event_type, "cable.broadcast");
//! # Ok(())
//! # }
//! ```

mod schema;
mod sql;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use opsline_core::{Event, EventId, Metadata, NewEvent};
use opsline_ports::{
    EventFilter, EventQuery, EventStore, GroupBy, GroupStats, StoreError, sort_groups,
};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};

pub use schema::SCHEMA_VERSION;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed event store. Clones share one connection.
#[derive(Clone)]
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEventStore").finish_non_exhaustive()
    }
}

impl SqliteEventStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StoreError::Unavailable(format!("open sqlite event store {}: {e}", path.display()))
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(map_sqlite_err)?;
        Self::init(conn)
    }

    /// A private, non-persistent database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(map_sqlite_err)?;
        schema::ensure_schema(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Applied schema version.
    pub fn schema_version(&self) -> Result<i64, StoreError> {
        schema::current_version(&self.conn.lock())
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, event: NewEvent) -> Result<EventId, StoreError> {
        event.validate()?;
        let metadata = serde_json::to_string(&event.metadata)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (event_type, name, correlation_id, request_id, tenant_id, \
             actor_id, duration_ms, occurred_at, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.event_type,
                event.name,
                event.correlation_id,
                event.request_id,
                event.tenant_id,
                event.actor_id,
                event.duration_ms,
                event.occurred_at.timestamp_micros(),
                metadata,
                Utc::now().timestamp_micros(),
            ],
        )
        .map_err(map_sqlite_err)?;
        Ok(EventId::new(conn.last_insert_rowid() as u64))
    }

    fn get(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM events WHERE id = ?1", sql::EVENT_COLUMNS),
                params![id.get() as i64],
                RawEvent::from_row,
            )
            .optional()
            .map_err(map_sqlite_err)?;
        raw.map(RawEvent::into_event).transpose()
    }

    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        let clause = sql::where_clause(&query.filter);
        let limit = query.limit.map_or(-1, |limit| limit as i64);
        let statement = format!(
            "SELECT {} FROM events{}{} LIMIT {limit}",
            sql::EVENT_COLUMNS,
            clause.sql,
            sql::order_by(query.order),
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&statement).map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map(params_from_iter(clause.params.iter()), RawEvent::from_row)
            .map_err(map_sqlite_err)?;
        rows.map(|row| row.map_err(map_sqlite_err)?.into_event())
            .collect()
    }

    fn count(&self, filter: &EventFilter) -> Result<u64, StoreError> {
        let clause = sql::where_clause(filter);
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM events{}", clause.sql),
            params_from_iter(clause.params.iter()),
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(map_sqlite_err)
    }

    fn aggregate(&self, filter: &EventFilter, by: GroupBy) -> Result<Vec<GroupStats>, StoreError> {
        let clause = sql::where_clause(filter);
        let column = sql::group_column(by);
        let statement = format!(
            "SELECT {column}, COUNT(*), AVG(duration_ms), MAX(duration_ms) \
             FROM events{} GROUP BY {column}",
            clause.sql
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&statement).map_err(map_sqlite_err)?;
        let mut groups = stmt
            .query_map(params_from_iter(clause.params.iter()), |row| {
                Ok(GroupStats {
                    key: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    avg_duration_ms: row.get(2)?,
                    max_duration_ms: row.get(3)?,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        sort_groups(&mut groups);
        Ok(groups)
    }

    fn count_distinct_correlations(&self, filter: &EventFilter) -> Result<u64, StoreError> {
        let clause = sql::where_clause(filter);
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT correlation_id) FROM events{}",
                clause.sql
            ),
            params_from_iter(clause.params.iter()),
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(map_sqlite_err)
    }

    fn purge(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM events WHERE occurred_at < ?1",
                params![before.timestamp_micros()],
            )
            .map_err(map_sqlite_err)
    }

    fn delete(&self, id: EventId) -> Result<bool, StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM events WHERE id = ?1", params![id.get() as i64])
            .map(|changed| changed > 0)
            .map_err(map_sqlite_err)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM events", [])
            .map_err(map_sqlite_err)
    }
}

/// Column values as read, before timestamp and JSON decoding.
struct RawEvent {
    id: i64,
    event_type: String,
    name: String,
    correlation_id: Option<String>,
    request_id: Option<String>,
    tenant_id: Option<String>,
    actor_id: Option<String>,
    duration_ms: Option<f64>,
    occurred_at: i64,
    metadata: String,
    created_at: i64,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            event_type: row.get(1)?,
            name: row.get(2)?,
            correlation_id: row.get(3)?,
            request_id: row.get(4)?,
            tenant_id: row.get(5)?,
            actor_id: row.get(6)?,
            duration_ms: row.get(7)?,
            occurred_at: row.get(8)?,
            metadata: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_event(self) -> Result<Event, StoreError> {
        let metadata: Metadata = serde_json::from_str(&self.metadata)?;
        Ok(Event {
            id: EventId::new(self.id as u64),
            event_type: self.event_type,
            name: self.name,
            correlation_id: self.correlation_id,
            request_id: self.request_id,
            tenant_id: self.tenant_id,
            actor_id: self.actor_id,
            duration_ms: self.duration_ms,
            occurred_at: micros_to_dt(self.occurred_at)?,
            metadata,
            created_at: micros_to_dt(self.created_at)?,
        })
    }
}

fn micros_to_dt(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Serialization(format!("timestamp {micros} out of range")))
}

pub(crate) fn map_sqlite_err(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StoreError::Unavailable(format!("sqlite: {err}"))
        }
        _ => StoreError::Backend(format!("sqlite: {err}")),
    }
}
