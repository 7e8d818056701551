//! SQL shared by the write transaction, the store and pooled readers.
//!
//! Every function takes a plain `&Connection` so it runs the same inside a
//! `BEGIN IMMEDIATE` transaction or on a read-only pooled connection.
//! Timestamps are stored as epoch milliseconds; `NULL` means absent.

use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use vantage_core::{
    error::{Result, VantageError},
    from_millis, to_millis, ChangedRecord, EventKey, LookupQuery, Record, RecordKey, State,
    StateFilter, Timestamp,
};

use crate::storage_err;

/// Stand-in for an absent timestamp inside `MAX()`; sorts before every real one.
const NO_TIME: i64 = i64::MIN;

const RECORD_COLUMNS: &str =
    "r.entry_pid, r.view_angle, r.collection, r.active, r.inactive, r.deleted, r.last_modified";

struct RawRecord {
    key: RecordKey,
    active: Option<i64>,
    inactive: Option<i64>,
    deleted: Option<i64>,
    last_modified: Option<i64>,
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        key: RecordKey {
            entry_pid: row.get(0)?,
            view_angle: row.get(1)?,
            collection: row.get(2)?,
        },
        active: row.get(3)?,
        inactive: row.get(4)?,
        deleted: row.get(5)?,
        last_modified: row.get(6)?,
    })
}

fn millis(ts: Option<Timestamp>) -> Option<i64> {
    ts.map(to_millis)
}

fn timestamp(ms: Option<i64>) -> Result<Option<Timestamp>> {
    ms.map(from_millis).transpose()
}

fn load_members(conn: &Connection, key: &RecordKey) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT object_pid FROM memberships
             WHERE entry_pid = ?1 AND view_angle = ?2 AND collection = ?3",
        )
        .map_err(storage_err)?;
    let members = stmt
        .query_map(
            params![key.entry_pid, key.view_angle, key.collection],
            |row| row.get(0),
        )
        .map_err(storage_err)?
        .collect::<rusqlite::Result<BTreeSet<String>>>()
        .map_err(storage_err)?;
    Ok(members)
}

fn hydrate(conn: &Connection, raw: RawRecord) -> Result<Record> {
    let objects = load_members(conn, &raw.key)?;
    Ok(Record {
        active: timestamp(raw.active)?,
        inactive: timestamp(raw.inactive)?,
        deleted: timestamp(raw.deleted)?,
        last_modified: timestamp(raw.last_modified)?,
        objects,
        key: raw.key,
    })
}

fn select_records<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Record>> {
    let raws = {
        let mut stmt = conn.prepare_cached(sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params, raw_record)
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;
        rows
    };
    raws.into_iter().map(|raw| hydrate(conn, raw)).collect()
}

pub fn get_record(conn: &Connection, key: &RecordKey) -> Result<Option<Record>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM records r
                 WHERE r.entry_pid = ?1 AND r.view_angle = ?2 AND r.collection = ?3"
            ),
            params![key.entry_pid, key.view_angle, key.collection],
            raw_record,
        )
        .optional()
        .map_err(storage_err)?;
    raw.map(|raw| hydrate(conn, raw)).transpose()
}

pub fn records_with_entry(conn: &Connection, pid: &str) -> Result<Vec<Record>> {
    select_records(
        conn,
        &format!(
            "SELECT {RECORD_COLUMNS} FROM records r
             WHERE r.entry_pid = ?1
             ORDER BY r.view_angle, r.collection"
        ),
        [pid],
    )
}

pub fn records_containing(conn: &Connection, pid: &str) -> Result<Vec<Record>> {
    select_records(
        conn,
        &format!(
            "SELECT {RECORD_COLUMNS} FROM records r
             JOIN memberships m
               ON m.entry_pid = r.entry_pid
              AND m.view_angle = r.view_angle
              AND m.collection = r.collection
             WHERE m.object_pid = ?1
             ORDER BY r.entry_pid, r.view_angle, r.collection"
        ),
        [pid],
    )
}

/// Upsert the record row and replace its membership rows.
pub fn save_record(conn: &Connection, record: &Record) -> Result<()> {
    let key = &record.key;
    conn.execute(
        "INSERT INTO records
            (entry_pid, view_angle, collection, active, inactive, deleted, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(entry_pid, view_angle, collection) DO UPDATE SET
            active = excluded.active,
            inactive = excluded.inactive,
            deleted = excluded.deleted,
            last_modified = excluded.last_modified",
        params![
            key.entry_pid,
            key.view_angle,
            key.collection,
            millis(record.active),
            millis(record.inactive),
            millis(record.deleted),
            millis(record.last_modified),
        ],
    )
    .map_err(storage_err)?;

    conn.execute(
        "DELETE FROM memberships WHERE entry_pid = ?1 AND view_angle = ?2 AND collection = ?3",
        params![key.entry_pid, key.view_angle, key.collection],
    )
    .map_err(storage_err)?;

    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO memberships (entry_pid, view_angle, collection, object_pid)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(storage_err)?;
    for object in &record.objects {
        stmt.execute(params![key.entry_pid, key.view_angle, key.collection, object])
            .map_err(storage_err)?;
    }

    Ok(())
}

pub fn read_cursor(conn: &Connection) -> Result<Option<EventKey>> {
    let cursor: Option<i64> = conn
        .query_row(
            "SELECT latest_key FROM tracker_meta WHERE id = 0",
            [],
            |row| row.get(0),
        )
        .map_err(storage_err)?;
    Ok(cursor.map(|k| k as EventKey))
}

pub fn write_cursor(conn: &Connection, key: EventKey) -> Result<()> {
    let key = i64::try_from(key)
        .map_err(|_| VantageError::InvalidArgument(format!("event key {} out of range", key)))?;
    conn.execute(
        "UPDATE tracker_meta SET latest_key = ?1, updated_at = datetime('now') WHERE id = 0",
        [key],
    )
    .map_err(storage_err)?;
    Ok(())
}

/// SQL for the timestamp a filter qualifies and orders records by.
fn qualifying_expr(filter: StateFilter) -> &'static str {
    match filter {
        StateFilter::Active => "MAX(IFNULL(active, :none), IFNULL(deleted, :none))",
        StateFilter::Inactive => "MAX(IFNULL(inactive, :none), IFNULL(deleted, :none))",
        StateFilter::Deleted => "IFNULL(deleted, :none)",
        StateFilter::Any => {
            "MAX(IFNULL(active, :none), IFNULL(inactive, :none), IFNULL(deleted, :none))"
        }
    }
}

/// Page through records of one angle and collection changed since `query.since`.
///
/// Rows are ordered by qualifying timestamp, then entry pid, so offset
/// paging over equal timestamps neither skips nor repeats rows.
pub fn lookup(conn: &Connection, query: &LookupQuery) -> Result<Vec<ChangedRecord>> {
    let sql = format!(
        "SELECT entry_pid, view_angle, collection, active, inactive, deleted, change_time
         FROM (
            SELECT entry_pid, view_angle, collection, active, inactive, deleted,
                   {} AS change_time
            FROM records
            WHERE view_angle = :view_angle AND collection = :collection
         )
         WHERE change_time > :none AND change_time >= :since
         ORDER BY change_time ASC, entry_pid ASC
         LIMIT :limit OFFSET :offset",
        qualifying_expr(query.filter)
    );

    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare_cached(&sql).map_err(storage_err)?;
    let rows = stmt
        .query_map(
            named_params! {
                ":view_angle": query.view_angle,
                ":collection": query.collection,
                ":none": NO_TIME,
                ":since": to_millis(query.since),
                ":limit": limit,
                ":offset": offset,
            },
            |row| {
                Ok((
                    RecordKey {
                        entry_pid: row.get(0)?,
                        view_angle: row.get(1)?,
                        collection: row.get(2)?,
                    },
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .map_err(storage_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_err)?;

    rows.into_iter()
        .map(|(key, active, inactive, deleted, change_time)| {
            let state = State::derive(timestamp(active)?, timestamp(inactive)?, timestamp(deleted)?);
            Ok(ChangedRecord {
                entry_pid: key.entry_pid,
                view_angle: key.view_angle,
                collection: key.collection,
                last_changed: from_millis(change_time)?,
                state,
            })
        })
        .collect()
}

/// Newest qualifying timestamp over one angle and collection, if any.
pub fn latest_modification_time(
    conn: &Connection,
    collection: &str,
    view_angle: &str,
    filter: StateFilter,
) -> Result<Option<Timestamp>> {
    let sql = format!(
        "SELECT MAX(change_time) FROM (
            SELECT {} AS change_time
            FROM records
            WHERE view_angle = :view_angle AND collection = :collection
         )
         WHERE change_time > :none",
        qualifying_expr(filter)
    );

    let latest: Option<i64> = conn
        .query_row(
            &sql,
            named_params! {
                ":view_angle": view_angle,
                ":collection": collection,
                ":none": NO_TIME,
            },
            |row| row.get(0),
        )
        .map_err(storage_err)?;
    timestamp(latest)
}

/// Row counts for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub records: u64,
    pub deleted: u64,
    pub memberships: u64,
}

pub fn stats(conn: &Connection) -> Result<IndexStats> {
    let (records, deleted): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*),
                    COUNT(CASE WHEN deleted IS NOT NULL
                               AND active IS NULL AND inactive IS NULL THEN 1 END)
             FROM records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(storage_err)?;
    let memberships: i64 = conn
        .query_row("SELECT COUNT(*) FROM memberships", [], |row| row.get(0))
        .map_err(storage_err)?;
    Ok(IndexStats {
        records: records as u64,
        deleted: deleted as u64,
        memberships: memberships as u64,
    })
}
