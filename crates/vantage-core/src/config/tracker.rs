use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for event dispatch in the update tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Datastream holding view-angle definitions
    /// Default: "VIEW"
    #[serde(default = "default_view_datastream")]
    pub view_datastream: String,

    /// Datastream holding an object's relations
    /// Default: "RELS-EXT"
    #[serde(default = "default_relations_datastream")]
    pub relations_datastream: String,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_view_datastream() -> String {
    "VIEW".to_string()
}

fn default_relations_datastream() -> String {
    "RELS-EXT".to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            view_datastream: default_view_datastream(),
            relations_datastream: default_relations_datastream(),
            cache: CacheConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// TTLs for the caching repository wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for angles, collections, content-model flags and states
    /// Default: 60000ms
    #[serde(default = "default_profile_ttl_ms")]
    pub profile_ttl_ms: u64,

    /// TTL for computed view bundles
    /// Default: 10000ms
    #[serde(default = "default_bundle_ttl_ms")]
    pub bundle_ttl_ms: u64,

    /// Entries per cache before expired entries are swept
    /// Default: 10000
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_profile_ttl_ms() -> u64 {
    60_000
}

fn default_bundle_ttl_ms() -> u64 {
    10_000
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            profile_ttl_ms: default_profile_ttl_ms(),
            bundle_ttl_ms: default_bundle_ttl_ms(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn profile_ttl(&self) -> Duration {
        Duration::from_millis(self.profile_ttl_ms)
    }

    pub fn bundle_ttl(&self) -> Duration {
        Duration::from_millis(self.bundle_ttl_ms)
    }
}
