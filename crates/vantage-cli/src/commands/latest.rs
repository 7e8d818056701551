//! Latest command implementation

use anyhow::Result;
use vantage::{from_millis, StoreConfig};

pub fn execute(store: StoreConfig, angle: &str, collection: &str, state: Option<&str>) -> Result<()> {
    let db = super::open_db(store)?;
    let facade = db.facade();

    let latest = super::runtime()?.block_on(facade.latest_modification_time(
        collection, angle, state,
    ))?;

    if latest == 0 {
        println!("No matching records");
    } else {
        println!("{} ({})", latest, from_millis(latest)?.to_rfc3339());
    }

    Ok(())
}
