//! Vantage: an incremental record index over a mutable object repository
//!
//! Repository objects are grouped into records: an entry object seen
//! through a view angle within a collection, together with the set of
//! objects in its view bundle. The index answers "which records of this
//! collection and angle changed since T" without rescanning the repository.
//!
//! - **Backend**: per-event record maintenance (state, relations, cascades)
//! - **Tracker**: one transaction per event, cursor advanced on commit
//! - **Processor**: polls the work log in key order with retry and
//!   dead-letter policies
//! - **Query facade**: paged "changed since" lookups
//!
//! # Quick Start
//!
//! ```ignore
//! use std::{path::Path, sync::Arc};
//! use vantage::prelude::*;
//!
//! let db = VantageDb::open("./index.db")?;
//! let tracker = Arc::new(db.tracker(my_repository, TrackerConfig::default()));
//! let feed = SqliteWorkLog::open(Path::new("./worklog.db"))?;
//! let mut processor = db.processor(feed, tracker, ProcessorConfig::default())?;
//! processor.run().await?;
//! ```

pub mod backend;
pub mod db;
pub mod dead_letter_queue;
pub mod facade;
pub mod prelude;
pub mod processor;
pub mod repository;
pub mod tracker;
pub mod worklog;

// Re-export core types
pub use vantage_core::{
    config::{
        load_json, BackoffStrategy, CacheConfig, MalformedEventPolicy, ProcessorConfig, ReadPoolConfig,
        StoreConfig, SynchronousMode, TrackerConfig,
    },
    error::{Result, VantageError},
    traits::{RecordStore, RecordTxn, Repository},
    types::{
        from_millis, to_millis, ChangedRecord, EventKey, LookupQuery, Record, RecordKey, State,
        StateFilter, Timestamp, ViewBundle, WorkLogUnit,
    },
};

// Re-export implementations
pub use vantage_sqlite::{IndexStats, SqliteRecordStore};

pub use backend::Backend;
pub use db::{CachedTracker, VantageDb};
pub use dead_letter_queue::{DeadLetterQueue, FailedEvent};
pub use facade::{ChangedEntry, QueryFacade};
pub use processor::{ErrorAction, ShutdownHandle, WorkLogProcessor, WorkLogProcessorBuilder};
pub use repository::CachingRepository;
pub use tracker::{Applied, UpdateTracker};
pub use worklog::{EventFeed, MemoryFeed, SqliteWorkLog, TrackerEvent};
