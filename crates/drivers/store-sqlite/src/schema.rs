//! Versioned schema for the `events` table.

use chrono::Utc;
use opsline_ports::StoreError;
use rusqlite::{Connection, params};

use crate::map_sqlite_err;

/// Newest schema this driver knows how to read.
pub const SCHEMA_VERSION: i64 = 1;

const MIGRATIONS: [(i64, &str, &str); 1] = [(
    1,
    "baseline_events",
    r"
    CREATE TABLE IF NOT EXISTS events (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      event_type TEXT NOT NULL,
      name TEXT NOT NULL,
      correlation_id TEXT,
      request_id TEXT,
      tenant_id TEXT,
      actor_id TEXT,
      duration_ms REAL,
      occurred_at INTEGER NOT NULL,
      metadata TEXT NOT NULL DEFAULT '{}',
      created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);
    CREATE INDEX IF NOT EXISTS idx_events_name ON events(name);
    CREATE INDEX IF NOT EXISTS idx_events_correlation_id ON events(correlation_id);
    CREATE INDEX IF NOT EXISTS idx_events_request_id ON events(request_id);
    CREATE INDEX IF NOT EXISTS idx_events_tenant_id ON events(tenant_id);
    CREATE INDEX IF NOT EXISTS idx_events_actor_id ON events(actor_id);
    CREATE INDEX IF NOT EXISTS idx_events_occurred_at ON events(occurred_at);
    CREATE INDEX IF NOT EXISTS idx_events_type_occurred_at ON events(event_type, occurred_at);
    ",
)];

/// Bring `conn` up to [`SCHEMA_VERSION`].
pub fn ensure_schema(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS opsline_schema_migrations (
          version INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          applied_at INTEGER NOT NULL
        );
        ",
    )
    .map_err(map_sqlite_err)?;

    let current = current_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(StoreError::backend(format!(
            "event schema version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    for (version, name, sql) in MIGRATIONS {
        if version <= current {
            continue;
        }
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        tx.execute_batch(sql).map_err(map_sqlite_err)?;
        tx.execute(
            "INSERT INTO opsline_schema_migrations(version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![version, name, Utc::now().timestamp_micros()],
        )
        .map_err(map_sqlite_err)?;
        tx.commit().map_err(map_sqlite_err)?;
        tracing::debug!(version, name, "applied event schema migration");
    }
    Ok(())
}

/// Highest applied migration, `0` for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM opsline_schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(map_sqlite_err)
}
