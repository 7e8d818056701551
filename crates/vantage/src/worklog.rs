//! Work-log decoding and the feeds that supply units to the processor.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use vantage_core::{
    error::{Result, VantageError},
    from_millis, to_millis, EventKey, State, Timestamp, WorkLogUnit,
};
use vantage_sqlite::storage_err;

/// Prefix some producers put in front of object identifiers.
const PID_URI_PREFIX: &str = "info:fedora/";

/// A decoded work-log unit, ready for dispatch to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    Created,
    /// `None` means "ask the repository"
    StateChanged(Option<State>),
    Purged,
    /// `None` for changes that never affect relations, such as a
    /// datastream's state or versionability flag
    DatastreamChanged(Option<String>),
    RelationsChanged,
    /// Read-only or unknown method; only the cursor moves
    Ignored { method: String, known: bool },
}

const READ_ONLY_METHODS: &[&str] = &[
    "getObjectXML",
    "export",
    "getDatastream",
    "getDatastreams",
    "getDatastreamHistory",
    "putTempStream",
    "getTempStream",
    "compareDatastreamChecksum",
    "getNextPID",
    "getRelationships",
    "validate",
];

impl TrackerEvent {
    /// Decode a unit's method and parameter.
    ///
    /// Both the canonical names and the repository's own API method names
    /// are accepted.
    pub fn decode(unit: &WorkLogUnit) -> Result<Self> {
        let param = unit
            .param
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let event = match unit.method.as_str() {
            "created" | "ingest" => TrackerEvent::Created,
            "stateChanged" | "modifyObject" => {
                let state = param
                    .map(|p| {
                        State::from_str(p).map_err(|_| {
                            VantageError::malformed(unit.key, format!("unknown state '{}'", p))
                        })
                    })
                    .transpose()?;
                TrackerEvent::StateChanged(state)
            }
            "purged" | "purgeObject" => TrackerEvent::Purged,
            "datastreamChanged"
            | "addDatastream"
            | "modifyDatastreamByReference"
            | "modifyDatastreamByValue"
            | "purgeDatastream" => TrackerEvent::DatastreamChanged(param.map(str::to_string)),
            "setDatastreamState" | "setDatastreamVersionable" => {
                TrackerEvent::DatastreamChanged(None)
            }
            "relationsChanged" | "addRelationship" | "purgeRelationship" => {
                TrackerEvent::RelationsChanged
            }
            other => TrackerEvent::Ignored {
                method: other.to_string(),
                known: READ_ONLY_METHODS.contains(&other),
            },
        };
        Ok(event)
    }
}

/// The unit's pid with any URI prefix removed. Empty pids are malformed.
pub fn normalize_pid(unit: &WorkLogUnit) -> Result<&str> {
    let pid = unit.pid.trim();
    let pid = pid.strip_prefix(PID_URI_PREFIX).unwrap_or(pid);
    if pid.is_empty() {
        return Err(VantageError::malformed(unit.key, "empty pid"));
    }
    Ok(pid)
}

/// Ordered, replayable source of work-log units
pub trait EventFeed: Send + Sync {
    /// Units with key greater than `after`, ascending, at most `limit`
    fn fetch(&self, after: Option<EventKey>, limit: usize) -> Result<Vec<WorkLogUnit>>;
}

/// In-memory feed for embedding and tests
#[derive(Default)]
pub struct MemoryFeed {
    units: Mutex<BTreeMap<EventKey, WorkLogUnit>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, replacing any unit with the same key.
    pub fn push(&self, unit: WorkLogUnit) {
        self.units.lock().insert(unit.key, unit);
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventFeed for MemoryFeed {
    fn fetch(&self, after: Option<EventKey>, limit: usize) -> Result<Vec<WorkLogUnit>> {
        let units = self.units.lock();
        let iter: Box<dyn Iterator<Item = &WorkLogUnit>> = match after {
            Some(after) => Box::new(
                units
                    .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                    .map(|(_, u)| u),
            ),
            None => Box::new(units.values()),
        };
        let batch = iter.take(limit).cloned().collect();
        Ok(batch)
    }
}

/// Work log kept in an SQLite table by the repository's producer.
///
/// Table: `update_tracker_logs(key, pid, happened, method, param)` with
/// `happened` in epoch milliseconds.
pub struct SqliteWorkLog {
    conn: Mutex<Connection>,
}

impl SqliteWorkLog {
    /// Open (and create if needed) the work-log database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(storage_err)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS update_tracker_logs (
                key INTEGER PRIMARY KEY AUTOINCREMENT,
                pid TEXT NOT NULL,
                happened INTEGER NOT NULL,
                method TEXT NOT NULL,
                param TEXT
            )",
            [],
        )
        .map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append a unit and return its key. Producers normally write the
    /// table directly; this is for tools and tests.
    pub fn append(
        &self,
        pid: &str,
        happened: Timestamp,
        method: &str,
        param: Option<&str>,
    ) -> Result<EventKey> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO update_tracker_logs (pid, happened, method, param)
             VALUES (?1, ?2, ?3, ?4)",
            params![pid, to_millis(happened), method, param],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid() as EventKey)
    }
}

impl EventFeed for SqliteWorkLog {
    fn fetch(&self, after: Option<EventKey>, limit: usize) -> Result<Vec<WorkLogUnit>> {
        let after = match after {
            Some(k) => i64::try_from(k).map_err(|_| {
                VantageError::InvalidArgument(format!("event key {} out of range", k))
            })?,
            None => i64::MIN,
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT key, pid, happened, method, param
                 FROM update_tracker_logs
                 WHERE key > ?1
                 ORDER BY key ASC
                 LIMIT ?2",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![after, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;

        rows.into_iter()
            .map(|(key, pid, happened, method, param)| {
                Ok(WorkLogUnit {
                    key: key as EventKey,
                    pid,
                    method,
                    param,
                    happened: from_millis(happened)?,
                })
            })
            .collect()
    }
}
