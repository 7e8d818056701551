use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vantage_core::{
    error::Result, observe, traits::RecordStore, ChangedRecord, EventKey, LookupQuery, ReadPoolConfig,
    Record, RecordKey, StateFilter, StoreConfig, Timestamp,
};

use crate::queries::{self, IndexStats};
use crate::read_pool::SqliteReadPool;
use crate::schema;
use crate::storage_err;
use crate::txn::SqliteRecordTxn;

const MEMORY_PATH: &str = ":memory:";

/// SQLite-backed record store
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
    read_pool: Option<Arc<SqliteReadPool>>,
}

impl SqliteRecordStore {
    /// Get the underlying writer connection (for side tables and custom queries)
    pub fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Pool of read-only connections, when enabled and the store is file-backed
    pub fn read_pool(&self) -> Option<&Arc<SqliteReadPool>> {
        self.read_pool.as_ref()
    }

    /// An in-memory store, mostly for tests. Never has a read pool.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(
            StoreConfig::new(MEMORY_PATH)
                .with_wal_mode(false)
                .with_read_pool(ReadPoolConfig::disabled()),
        )
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.conn.lock();
        queries::stats(&conn)
    }

    /// Configure SQLite connection
    fn configure_connection(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(storage_err)?;
        }

        conn.pragma_update(None, "synchronous", cfg.synchronous.pragma_value())
            .map_err(storage_err)?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err)?;

        conn.pragma_update(None, "cache_size", cfg.cache_size)
            .map_err(storage_err)?;

        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
            .map_err(storage_err)?;

        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    type Txn<'a> = SqliteRecordTxn<'a>;

    fn open(cfg: StoreConfig) -> Result<Self> {
        cfg.validate()?;
        let in_memory = cfg.path.as_os_str() == MEMORY_PATH;
        if !in_memory {
            if let Some(parent) = cfg.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let conn = Connection::open_with_flags(
            &cfg.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(storage_err)?;

        Self::configure_connection(&conn, &cfg)?;
        schema::init(&conn)?;

        let read_pool = if cfg.read_pool.enabled && !in_memory {
            Some(Arc::new(SqliteReadPool::new(
                &cfg.path,
                cfg.read_pool.clone(),
            )?))
        } else {
            None
        };

        tracing::info!(
            path = %cfg.path.display(),
            read_pool = read_pool.is_some(),
            "Opened record store"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: cfg,
            read_pool,
        })
    }

    fn close(&self) -> Result<()> {
        // SQLite connections close on drop
        Ok(())
    }

    fn begin_txn(&self) -> Result<Self::Txn<'_>> {
        SqliteRecordTxn::new(self.conn.lock())
    }

    fn get_cursor(&self) -> Result<Option<EventKey>> {
        let conn = self.conn.lock();
        queries::read_cursor(&conn)
    }

    fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        let conn = self.conn.lock();
        queries::get_record(&conn, key)
    }

    fn lookup(&self, query: &LookupQuery) -> Result<Vec<ChangedRecord>> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let rows = queries::lookup(&conn, query)?;
        observe::record_lookup(start.elapsed(), rows.len());
        Ok(rows)
    }

    fn latest_modification_time(
        &self,
        collection: &str,
        view_angle: &str,
        filter: StateFilter,
    ) -> Result<Option<Timestamp>> {
        let conn = self.conn.lock();
        queries::latest_modification_time(&conn, collection, view_angle, filter)
    }

    fn migrate(&self, target_version: u32) -> Result<()> {
        let conn = self.conn.lock();
        schema::migrate(&conn, target_version)
    }

    fn schema_version(&self) -> Result<u32> {
        let conn = self.conn.lock();
        schema::version(&conn)
    }
}
