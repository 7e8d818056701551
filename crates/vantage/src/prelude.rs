//! Vantage Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use vantage::prelude::*;
//! ```

// Core types
pub use crate::{
    EventKey, Record, RecordKey, Result, State, StateFilter, Timestamp, VantageError, ViewBundle,
    WorkLogUnit,
};

// Configs
pub use crate::{
    CacheConfig, MalformedEventPolicy, ProcessorConfig, StoreConfig, SynchronousMode,
    TrackerConfig,
};

// Traits
pub use crate::{EventFeed, RecordStore, RecordTxn, Repository};

// Implementations
pub use crate::{
    Applied, CachingRepository, DeadLetterQueue, MemoryFeed, QueryFacade, SqliteRecordStore,
    SqliteWorkLog, UpdateTracker, VantageDb, WorkLogProcessor,
};
