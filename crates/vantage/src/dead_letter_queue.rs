//! Dead Letter Queue
//!
//! Keeps work-log units that were skipped under
//! [`MalformedEventPolicy::SkipAndAdvance`] so an operator can inspect them
//! and repair the index out of band.
//!
//! [`MalformedEventPolicy::SkipAndAdvance`]: vantage_core::MalformedEventPolicy::SkipAndAdvance

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use vantage_core::{
    error::{Result, VantageError},
    to_millis, EventKey, WorkLogUnit,
};
use vantage_sqlite::storage_err;

/// A skipped work-log unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEvent {
    pub id: i64,
    pub event_key: EventKey,
    pub pid: String,
    pub method: String,
    pub param: Option<String>,
    /// Epoch milliseconds of the original unit
    pub happened: i64,
    pub error_message: String,
    pub failed_at: String,
    pub retry_count: i32,
}

const COLUMNS: &str =
    "id, event_key, pid, method, param, happened, error_message, failed_at, retry_count";

fn failed_event(row: &Row<'_>) -> rusqlite::Result<FailedEvent> {
    Ok(FailedEvent {
        id: row.get(0)?,
        event_key: row.get::<_, i64>(1)? as EventKey,
        pid: row.get(2)?,
        method: row.get(3)?,
        param: row.get(4)?,
        happened: row.get(5)?,
        error_message: row.get(6)?,
        failed_at: row.get(7)?,
        retry_count: row.get(8)?,
    })
}

/// Dead Letter Queue stored next to the record index
pub struct DeadLetterQueue {
    conn: Arc<Mutex<Connection>>,
}

impl DeadLetterQueue {
    /// Create the queue on `conn`, usually the record store's writer connection
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let dlq = Self { conn };
        dlq.init()?;
        Ok(dlq)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS dead_letter_queue (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_key INTEGER NOT NULL UNIQUE,
                    pid TEXT NOT NULL,
                    method TEXT NOT NULL,
                    param TEXT,
                    happened INTEGER NOT NULL,
                    error_message TEXT NOT NULL,
                    failed_at TEXT NOT NULL DEFAULT (datetime('now')),
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    last_retry_at TEXT
                );",
            )
            .map_err(storage_err)?;
        Ok(())
    }

    /// Record a skipped unit. Adding the same key again refreshes the error.
    pub fn add(&self, unit: &WorkLogUnit, error: &VantageError) -> Result<i64> {
        let key = i64::try_from(unit.key).map_err(|_| {
            VantageError::InvalidArgument(format!("event key {} out of range", unit.key))
        })?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO dead_letter_queue (event_key, pid, method, param, happened, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(event_key) DO UPDATE SET
                error_message = excluded.error_message,
                failed_at = datetime('now')",
            params![
                key,
                unit.pid,
                unit.method,
                unit.param,
                to_millis(unit.happened),
                error.to_string()
            ],
        )
        .map_err(storage_err)?;

        conn.query_row(
            "SELECT id FROM dead_letter_queue WHERE event_key = ?1",
            [key],
            |row| row.get(0),
        )
        .map_err(storage_err)
    }

    pub fn get(&self, id: i64) -> Result<Option<FailedEvent>> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {COLUMNS} FROM dead_letter_queue WHERE id = ?1"),
                [id],
                failed_event,
            )
            .optional()
            .map_err(storage_err)
    }

    /// Oldest events first, by work-log key
    pub fn list(&self, limit: usize) -> Result<Vec<FailedEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM dead_letter_queue ORDER BY event_key ASC LIMIT ?1"
            ))
            .map_err(storage_err)?;
        let events = stmt
            .query_map([i64::try_from(limit).unwrap_or(i64::MAX)], failed_event)
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;
        Ok(events)
    }

    /// Mark an event as retried by an operator
    pub fn mark_retry(&self, id: i64) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE dead_letter_queue
                 SET retry_count = retry_count + 1,
                     last_retry_at = datetime('now')
                 WHERE id = ?1",
                [id],
            )
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn remove(&self, id: i64) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM dead_letter_queue WHERE id = ?1", [id])
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM dead_letter_queue", [], |row| {
                row.get(0)
            })
            .map_err(storage_err)?;
        Ok(count as usize)
    }

    /// Clear all failed events
    pub fn clear(&self) -> Result<usize> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM dead_letter_queue", [])
            .map_err(storage_err)?;
        Ok(removed)
    }
}
