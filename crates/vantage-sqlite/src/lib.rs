//! SQLite persistence for the vantage record index
//!
//! A single writer connection serves [`SqliteRecordTxn`] transactions that
//! persist records and advance the event cursor together; an optional pool
//! of read-only connections serves lookups concurrently.

pub mod queries;
pub mod read_pool;
pub mod schema;
pub mod store;
pub mod txn;

pub use queries::IndexStats;
pub use read_pool::{PooledSqliteConnection, SqliteReadPool};
pub use store::SqliteRecordStore;
pub use txn::SqliteRecordTxn;

use rusqlite::ErrorCode;
use vantage_core::VantageError;

/// Map a driver error, separating lock contention from real failures.
pub fn storage_err(e: rusqlite::Error) -> VantageError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            VantageError::Busy(e.to_string())
        }
        _ => VantageError::Storage(e.to_string()),
    }
}
