use parking_lot::MutexGuard;
use rusqlite::Connection;
use std::time::Instant;
use vantage_core::{
    error::Result, observe, traits::RecordTxn, EventKey, Record, RecordKey,
};

use crate::{queries, storage_err};

/// Write transaction holding the store's single writer connection.
pub struct SqliteRecordTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    in_txn: bool,
}

impl<'a> SqliteRecordTxn<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Result<Self> {
        conn.execute("BEGIN IMMEDIATE TRANSACTION", [])
            .map_err(storage_err)?;

        Ok(Self { conn, in_txn: true })
    }
}

impl<'a> RecordTxn for SqliteRecordTxn<'a> {
    fn cursor(&self) -> Result<Option<EventKey>> {
        queries::read_cursor(&self.conn)
    }

    fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        queries::get_record(&self.conn, key)
    }

    fn save(&mut self, record: &Record) -> Result<()> {
        tracing::trace!(record = %record.key, state = %record.state(), "saving record");
        queries::save_record(&self.conn, record)
    }

    fn all_with_entry_pid(&self, pid: &str) -> Result<Vec<Record>> {
        queries::records_with_entry(&self.conn, pid)
    }

    fn all_containing_pid(&self, pid: &str) -> Result<Vec<Record>> {
        queries::records_containing(&self.conn, pid)
    }

    fn commit(mut self: Box<Self>, new_cursor: EventKey) -> Result<()> {
        if self.in_txn {
            let start = Instant::now();
            queries::write_cursor(&self.conn, new_cursor)?;

            self.conn
                .execute("COMMIT", [])
                .map_err(storage_err)?;

            self.in_txn = false;
            observe::record_commit(start.elapsed());
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) {
        if self.in_txn {
            let _ = self.conn.execute("ROLLBACK", []);
            self.in_txn = false;
        }
    }
}

impl<'a> Drop for SqliteRecordTxn<'a> {
    fn drop(&mut self) {
        if self.in_txn {
            let _ = self.conn.execute("ROLLBACK", []);
        }
    }
}
