//! Vantage Core: types and traits for the vantage record index
//!
//! This crate defines the abstractions shared by the storage backend and the
//! tracker:
//! - Record model: (entry, view angle, collection) aggregates with an
//!   active/inactive/deleted lifecycle kept by max-merged timestamps
//! - Repository: the as-of-a-date questions the index is derived from
//! - Record store: transactional persistence with an event cursor
//! - Configuration, errors and optional metrics hooks

pub mod cache;
pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use cache::TtlCache;
pub use config::{
    BackoffStrategy, CacheConfig, MalformedEventPolicy, ProcessorConfig, ReadPoolConfig,
    StoreConfig, SynchronousMode, TrackerConfig,
};
pub use error::{Result, VantageError};
pub use traits::{RecordStore, RecordTxn, Repository};
pub use types::{
    from_millis, to_millis, ChangedRecord, EventKey, LookupQuery, Record, RecordKey, State,
    StateFilter, Timestamp, ViewBundle, WorkLogUnit,
};
