//! Lookup command implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use vantage::{to_millis, StoreConfig};

pub struct LookupArgs {
    pub since: String,
    pub angle: String,
    pub collection: String,
    pub state: Option<String>,
    pub offset: usize,
    pub limit: usize,
    pub json: bool,
}

/// Epoch milliseconds, or an RFC 3339 timestamp.
fn parse_since(raw: &str) -> Result<i64> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    let ts = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid --since '{}'", raw))?;
    Ok(to_millis(ts.with_timezone(&Utc)))
}

pub fn execute(store: StoreConfig, args: LookupArgs) -> Result<()> {
    let since = parse_since(&args.since)?;
    let db = super::open_db(store)?;
    let facade = db.facade();

    let rows = super::runtime()?.block_on(facade.lookup(
        since,
        &args.angle,
        args.offset,
        args.limit,
        args.state.as_deref(),
        &args.collection,
    ))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No records changed since {}", since);
        return Ok(());
    }

    println!("{:<40} {:<30} {:>15} {}", "ENTRY", "COLLECTION", "CHANGED", "STATE");
    for row in &rows {
        println!(
            "{:<40} {:<30} {:>15} {}",
            row.entry_pid, row.collection_pid, row.last_changed_time, row.state
        );
    }
    println!("\n{} record(s)", rows.len());

    Ok(())
}
