use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, VantageError};

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_CACHE_SIZE: i32 = -64_000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Read-only connections serving lookups beside the writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReadPoolConfig {
    pub enabled: bool,
    pub pool_size: usize,
    /// How long a lookup waits for a free reader before failing with `Busy`
    pub acquire_timeout_ms: u64,
}

impl Default for ReadPoolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl ReadPoolConfig {
    pub fn enabled(pool_size: usize) -> Self {
        Self {
            enabled: true,
            pool_size,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }
}

/// Where the record index lives and how its SQLite connections are tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,

    #[serde(default = "yes")]
    pub wal_mode: bool,

    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// Pages when positive, KiB when negative
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Writer wait on a locked database before the error surfaces as `Busy`
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// On by default with four readers; ignored for in-memory stores
    #[serde(default = "default_read_pool")]
    pub read_pool: ReadPoolConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    Full,
    #[default]
    Normal,
    Off,
}

impl SynchronousMode {
    pub fn pragma_value(&self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

fn yes() -> bool {
    true
}

fn default_cache_size() -> i32 {
    DEFAULT_CACHE_SIZE
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_read_pool() -> ReadPoolConfig {
    ReadPoolConfig::enabled(DEFAULT_POOL_SIZE)
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: true,
            synchronous: SynchronousMode::default(),
            cache_size: DEFAULT_CACHE_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            read_pool: default_read_pool(),
        }
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub fn with_cache_size(mut self, cache_size: i32) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn with_read_pool(mut self, config: ReadPoolConfig) -> Self {
        self.read_pool = config;
        self
    }

    pub fn with_read_pool_size(mut self, pool_size: usize) -> Self {
        self.read_pool = ReadPoolConfig::enabled(pool_size);
        self
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(VantageError::Config("store path is empty".into()));
        }
        if self.read_pool.enabled && self.read_pool.pool_size == 0 {
            return Err(VantageError::Config(
                "read pool enabled with zero connections".into(),
            ));
        }
        if self.read_pool.enabled && !self.wal_mode {
            // readers would block behind every write transaction
            return Err(VantageError::Config(
                "read pool requires WAL mode".into(),
            ));
        }
        Ok(())
    }
}
