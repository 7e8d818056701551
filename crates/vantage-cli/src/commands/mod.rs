pub mod dlq;
pub mod latest;
pub mod lookup;
pub mod status;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use vantage::{load_json, StoreConfig, VantageDb};

pub const DEFAULT_DB_PATH: &str = "./vantage.db";

/// Store settings from `--config` (JSON) with `--db` overriding its path.
pub fn store_config(db: Option<PathBuf>, config: Option<&Path>) -> Result<StoreConfig> {
    let mut store = match config {
        Some(file) => load_json::<StoreConfig>(file)
            .with_context(|| format!("Failed to load config {}", file.display()))?,
        None => StoreConfig::new(DEFAULT_DB_PATH),
    };
    if let Some(path) = db {
        store.path = path;
    }
    store
        .validate()
        .context("Invalid store configuration")?;
    Ok(store)
}

/// Open an existing index; the CLI never creates one.
pub fn open_db(config: StoreConfig) -> Result<VantageDb> {
    let path = config.path.clone();
    if !path.exists() {
        bail!("No index database at {}", path.display());
    }
    VantageDb::open_with_config(config)
        .with_context(|| format!("Failed to open index at {}", path.display()))
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start async runtime")
}
