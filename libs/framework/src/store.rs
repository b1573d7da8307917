//! SQLite-backed durable event store.
//!
//! Holds event snapshots and the notices that bind a stored event to the
//! observers still waiting for it. The store keeps one transaction open for
//! the whole process invocation: nothing is persisted unless [`EventStore::commit`]
//! runs, so an invocation that fails midway leaves the previous state intact.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Errors from event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt snapshot for {handle}: {source}")]
    Corrupt {
        handle: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A pending delivery of a stored event to one observer method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub event_path: String,
    pub observer_path: String,
    pub method_name: String,
}

/// SQLite event store.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Single writer per invocation
        conn.execute_batch("PRAGMA locking_mode=EXCLUSIVE;")?;

        Self::init(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.init_schema()?;
        store.conn.execute_batch("BEGIN;")?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot (
                handle TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notice (
                sequence INTEGER PRIMARY KEY AUTOINCREMENT,
                event_path TEXT NOT NULL,
                observer_path TEXT NOT NULL,
                method_name TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Event store schema initialized");
        Ok(())
    }

    /// Persist everything written so far and start a new transaction.
    pub fn commit(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT; BEGIN;")?;
        Ok(())
    }

    /// Insert or replace the snapshot stored under `handle`.
    pub fn save_snapshot(&self, handle: &str, data: &Map<String, Value>) -> Result<(), StoreError> {
        let data = Value::Object(data.clone()).to_string();
        self.conn.execute(
            "REPLACE INTO snapshot (handle, data) VALUES (?1, ?2)",
            params![handle, data],
        )?;
        Ok(())
    }

    /// Load the snapshot stored under `handle`.
    pub fn load_snapshot(&self, handle: &str) -> Result<Option<Map<String, Value>>, StoreError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM snapshot WHERE handle = ?1",
                params![handle],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|data| {
            serde_json::from_str(&data).map_err(|source| StoreError::Corrupt {
                handle: handle.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Delete the snapshot stored under `handle`.
    pub fn drop_snapshot(&self, handle: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM snapshot WHERE handle = ?1", params![handle])?;
        Ok(())
    }

    /// Record that `observer_path.method_name` still has to see `event_path`.
    pub fn save_notice(
        &self,
        event_path: &str,
        observer_path: &str,
        method_name: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO notice (event_path, observer_path, method_name) VALUES (?1, ?2, ?3)",
            params![event_path, observer_path, method_name],
        )?;
        Ok(())
    }

    pub fn drop_notice(&self, notice: &Notice) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM notice WHERE event_path = ?1 AND observer_path = ?2 AND method_name = ?3",
            params![notice.event_path, notice.observer_path, notice.method_name],
        )?;
        Ok(())
    }

    /// Stored notices in insertion order, optionally for a single event.
    pub fn notices(&self, event_path: Option<&str>) -> Result<Vec<Notice>, StoreError> {
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(Notice {
                event_path: row.get(0)?,
                observer_path: row.get(1)?,
                method_name: row.get(2)?,
            })
        };

        let notices = match event_path {
            Some(path) => {
                let mut stmt = self.conn.prepare(
                    "SELECT event_path, observer_path, method_name FROM notice
                     WHERE event_path = ?1 ORDER BY sequence",
                )?;
                let rows = stmt.query_map(params![path], map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT event_path, observer_path, method_name FROM notice ORDER BY sequence",
                )?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(notices)
    }
}
