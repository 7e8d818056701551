//! Unified index handle
//!
//! Opens the record store, its dead-letter queue and the query facade
//! together, and wires trackers and processors on top.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use vantage_core::{
    error::Result, traits::Repository, ProcessorConfig, RecordStore, StoreConfig, TrackerConfig,
};
use vantage_sqlite::SqliteRecordStore;

use crate::dead_letter_queue::DeadLetterQueue;
use crate::facade::QueryFacade;
use crate::processor::WorkLogProcessor;
use crate::repository::CachingRepository;
use crate::tracker::UpdateTracker;
use crate::worklog::EventFeed;

/// Tracker type produced by [`VantageDb::tracker`]
pub type CachedTracker<R> = UpdateTracker<SqliteRecordStore, CachingRepository<R>>;

pub struct VantageDb {
    store: Arc<SqliteRecordStore>,
    dlq: Arc<DeadLetterQueue>,
    path: PathBuf,
}

impl VantageDb {
    /// Open (or create) the index database at `path` with default settings
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(StoreConfig::new(path.as_ref()))
    }

    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        let path = config.path.clone();
        let store = Arc::new(SqliteRecordStore::open(config)?);
        let dlq = Arc::new(DeadLetterQueue::new(store.conn().clone())?);
        Ok(Self { store, dlq, path })
    }

    pub fn store(&self) -> &Arc<SqliteRecordStore> {
        &self.store
    }

    pub fn dead_letter_queue(&self) -> &Arc<DeadLetterQueue> {
        &self.dlq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn facade(&self) -> QueryFacade {
        QueryFacade::new(self.store.clone())
    }

    /// A tracker over this index with `repository` wrapped in TTL caches
    pub fn tracker<R: Repository>(&self, repository: R, config: TrackerConfig) -> CachedTracker<R> {
        let repository = CachingRepository::new(repository, &config.cache);
        UpdateTracker::with_config(self.store.clone(), repository, config)
    }

    /// A processor feeding `tracker` from `feed`, dead-lettering into this index
    pub fn processor<F, R>(
        &self,
        feed: F,
        tracker: Arc<UpdateTracker<SqliteRecordStore, R>>,
        config: ProcessorConfig,
    ) -> Result<WorkLogProcessor<F, SqliteRecordStore, R>>
    where
        F: EventFeed,
        R: Repository,
    {
        WorkLogProcessor::builder(feed, tracker)
            .with_config(config)
            .with_dead_letter_queue(self.dlq.clone())
            .build()
    }

    /// Prepare for shutdown
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}
