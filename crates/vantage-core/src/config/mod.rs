pub mod processor;
pub mod store;
pub mod tracker;

pub use processor::{BackoffStrategy, MalformedEventPolicy, ProcessorConfig};
pub use store::{ReadPoolConfig, StoreConfig, SynchronousMode};
pub use tracker::{CacheConfig, TrackerConfig};

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::{Result, VantageError};

/// Load any configuration struct from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| VantageError::Config(format!("{}: {}", path.display(), e)))
}
