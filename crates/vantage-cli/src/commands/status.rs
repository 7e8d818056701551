//! Status command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use vantage::prelude::*;

/// Pending units are only counted up to this many
const LAG_SCAN_LIMIT: usize = 100_000;

pub fn execute(config: StoreConfig, worklog: Option<PathBuf>) -> Result<()> {
    tracing::info!("Checking index status: {}", config.path.display());

    let db = super::open_db(config.clone())?;
    let store = db.store();

    println!("\nIndex Status");
    println!("{}", "=".repeat(60));
    println!("Path: {}", config.path.display());

    let schema_version = store
        .schema_version()
        .context("Failed to get schema version")?;
    println!("Schema Version: {}", schema_version);

    let cursor = store.get_cursor().context("Failed to get cursor")?;
    match cursor {
        Some(key) => println!("Last Applied Event: {}", key),
        None => println!("Last Applied Event: none"),
    }

    let stats = store.stats().context("Failed to count records")?;
    println!("\nRecords:");
    println!("  Total: {}", stats.records);
    println!("  Deleted: {}", stats.deleted);
    println!("  Memberships: {}", stats.memberships);

    let dead = db
        .dead_letter_queue()
        .count()
        .context("Failed to count dead letters")?;
    println!("\nDead Letters: {}", dead);

    if let Some(path) = worklog {
        let feed = SqliteWorkLog::open(&path).context("Failed to open work log")?;
        let pending = feed
            .fetch(cursor, LAG_SCAN_LIMIT)
            .context("Failed to read work log")?
            .len();
        if pending == 0 {
            println!("\n✓ Index is up to date");
        } else if pending == LAG_SCAN_LIMIT {
            println!("\n⚠️  Index lag: at least {} unit(s) behind", pending);
        } else {
            println!("\n⚠️  Index lag: {} unit(s) behind", pending);
        }
    }

    if dead > 0 {
        println!("Run 'vantage dlq list' to inspect skipped units");
    }

    Ok(())
}
