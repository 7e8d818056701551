use rusqlite::Connection;
use vantage_core::error::{Result, VantageError};

use crate::storage_err;

/// Schema version written by [`init`].
pub const CURRENT_VERSION: u32 = 1;

/// Create the tracker tables if they do not exist yet.
///
/// `records` never loses rows: deletion is a tombstone so "changed since"
/// scans keep seeing deleted records. Memberships are indexed by object pid
/// for the "records containing pid" search.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tracker_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            latest_key INTEGER,
            schema_version INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS records (
            entry_pid TEXT NOT NULL,
            view_angle TEXT NOT NULL,
            collection TEXT NOT NULL,
            active INTEGER,
            inactive INTEGER,
            deleted INTEGER,
            last_modified INTEGER,
            PRIMARY KEY (entry_pid, view_angle, collection)
        );

        CREATE INDEX IF NOT EXISTS idx_records_angle_collection
            ON records(view_angle, collection);

        CREATE TABLE IF NOT EXISTS memberships (
            entry_pid TEXT NOT NULL,
            view_angle TEXT NOT NULL,
            collection TEXT NOT NULL,
            object_pid TEXT NOT NULL,
            PRIMARY KEY (entry_pid, view_angle, collection, object_pid),
            FOREIGN KEY (entry_pid, view_angle, collection)
                REFERENCES records(entry_pid, view_angle, collection)
        );

        CREATE INDEX IF NOT EXISTS idx_memberships_object
            ON memberships(object_pid);",
    )
    .map_err(storage_err)?;

    // NULL cursor: no events applied yet
    conn.execute(
        "INSERT OR IGNORE INTO tracker_meta (id, latest_key, schema_version)
         VALUES (0, NULL, ?1)",
        [CURRENT_VERSION as i64],
    )
    .map_err(storage_err)?;

    Ok(())
}

pub fn version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT schema_version FROM tracker_meta WHERE id = 0",
        [],
        |row| {
            let v: i64 = row.get(0)?;
            Ok(v as u32)
        },
    )
    .map_err(storage_err)
}

/// Move the recorded schema version forward to `target_version`.
///
/// Downgrades are rejected; the index is rebuilt out of band instead.
pub fn migrate(conn: &Connection, target_version: u32) -> Result<()> {
    let current_version = version(conn)?;

    if target_version < current_version {
        return Err(VantageError::InvalidState(format!(
            "Cannot downgrade schema version from {} to {}",
            current_version, target_version
        )));
    }

    if current_version == target_version {
        return Ok(());
    }

    tracing::info!(
        from = current_version,
        to = target_version,
        "Migrating tracker schema"
    );
    conn.execute(
        "UPDATE tracker_meta SET schema_version = ?1, updated_at = datetime('now') WHERE id = 0",
        [target_version as i64],
    )
    .map_err(storage_err)?;

    Ok(())
}
