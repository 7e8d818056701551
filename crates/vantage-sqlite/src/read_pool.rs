//! Read-only connections for lookups.
//!
//! Lookups check a connection out of an idle stack, guarded by a semaphore
//! with one permit per connection, and hand it back on drop. With WAL the
//! readers see the last committed state while the tracker holds the writer.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use vantage_core::{
    error::{Result, VantageError},
    ReadPoolConfig,
};

use crate::storage_err;

/// A checked-out reader. Goes back to the idle stack when dropped.
pub struct PooledSqliteConnection<'a> {
    conn: Option<Connection>,
    pool: &'a SqliteReadPool,
    _permit: SemaphorePermit<'a>,
}

impl PooledSqliteConnection<'_> {
    pub fn connection(&self) -> &Connection {
        // only emptied in Drop
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledSqliteConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push(conn);
        }
    }
}

/// Fixed-size pool of `SQLITE_OPEN_READ_ONLY` connections.
///
/// ```ignore
/// let pool = SqliteReadPool::new(&db_path, ReadPoolConfig::enabled(4))?;
/// let reader = pool.acquire().await?;
/// let rows = queries::lookup(reader.connection(), &query)?;
/// ```
pub struct SqliteReadPool {
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
    size: usize,
    acquire_timeout: Duration,
    db_path: PathBuf,
}

impl SqliteReadPool {
    pub fn new(db_path: &Path, config: ReadPoolConfig) -> Result<Self> {
        let size = config.pool_size.max(1);
        let idle = (0..size)
            .map(|_| open_reader(db_path, config.acquire_timeout_ms))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(path = %db_path.display(), size, "Opened read pool");

        Ok(Self {
            idle: Mutex::new(idle),
            permits: Semaphore::new(size),
            size,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            db_path: db_path.to_path_buf(),
        })
    }

    /// Wait for a free reader. Running out of time is `Busy`, so callers
    /// retry it like writer contention.
    pub async fn acquire(&self) -> Result<PooledSqliteConnection<'_>> {
        let permit = match tokio::time::timeout(self.acquire_timeout, self.permits.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(closed)) => {
                return Err(VantageError::InvalidState(format!("read pool closed: {}", closed)))
            }
            Err(_) => {
                return Err(VantageError::Busy(format!(
                    "no reader free within {:?}",
                    self.acquire_timeout
                )))
            }
        };

        let conn = self.idle.lock().pop().ok_or_else(|| {
            VantageError::InvalidState("read pool permit without an idle connection".into())
        })?;

        Ok(PooledSqliteConnection {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        })
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn pool_size(&self) -> usize {
        self.size
    }
}

fn open_reader(path: &Path, busy_timeout_ms: u64) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(storage_err)?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
        .map_err(storage_err)?;
    Ok(conn)
}
