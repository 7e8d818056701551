use std::collections::BTreeSet;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::types::{ChangedRecord, EventKey, LookupQuery, Record, RecordKey, StateFilter, Timestamp};

/// Write transaction over the record index
///
/// All reads see the transaction's own uncommitted writes. Dropping a
/// transaction without committing rolls it back.
///
/// Note: Not required to be Send, the SQLite transaction holds a lock guard
pub trait RecordTxn {
    /// Highest event key applied so far, `None` for an empty index
    fn cursor(&self) -> Result<Option<EventKey>>;

    fn get(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Upsert a record and its membership set; records are never removed
    fn save(&mut self, record: &Record) -> Result<()>;

    /// Records whose entry is `pid`
    fn all_with_entry_pid(&self, pid: &str) -> Result<Vec<Record>>;

    /// Records whose membership set contains `pid`, entry or not
    fn all_containing_pid(&self, pid: &str) -> Result<Vec<Record>>;

    /// Records of `entry_pid` outside `angles × collections`
    ///
    /// A record is returned when its angle is not in `angles` or its
    /// collection is not in `collections`, so empty sets return every
    /// record of the entry.
    fn not_in_collections_or_angles(
        &self,
        entry_pid: &str,
        angles: &BTreeSet<String>,
        collections: &BTreeSet<String>,
    ) -> Result<Vec<Record>> {
        Ok(self
            .all_with_entry_pid(entry_pid)?
            .into_iter()
            .filter(|r| {
                !angles.contains(&r.key.view_angle) || !collections.contains(&r.key.collection)
            })
            .collect())
    }

    /// Commit the transaction, advancing the cursor to `new_cursor` atomically
    fn commit(self: Box<Self>, new_cursor: EventKey) -> Result<()>;

    /// Rollback transaction
    fn rollback(self: Box<Self>);
}

/// Record store: durable index plus its event cursor
///
/// Provides:
/// - Transactional record writes with cursor-on-commit
/// - Point-in-time "changed since" lookups
/// - Schema version tracking
pub trait RecordStore: Send + Sync {
    type Txn<'a>: RecordTxn
    where
        Self: 'a;

    /// Open a record store
    fn open(cfg: StoreConfig) -> Result<Self>
    where
        Self: Sized;

    /// Close the store
    fn close(&self) -> Result<()>;

    /// Begin a write transaction
    fn begin_txn(&self) -> Result<Self::Txn<'_>>;

    /// Get the current cursor (last applied event key)
    fn get_cursor(&self) -> Result<Option<EventKey>>;

    fn get(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Records of one angle and collection changed at or after `query.since`
    fn lookup(&self, query: &LookupQuery) -> Result<Vec<ChangedRecord>>;

    /// Newest qualifying timestamp among matching records
    fn latest_modification_time(
        &self,
        collection: &str,
        view_angle: &str,
        filter: StateFilter,
    ) -> Result<Option<Timestamp>>;

    /// Run migrations to target schema version
    fn migrate(&self, target_version: u32) -> Result<()>;

    /// Get the schema version
    fn schema_version(&self) -> Result<u32>;
}
