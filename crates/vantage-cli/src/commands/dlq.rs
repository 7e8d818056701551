//! Dead letter queue commands

use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use vantage::StoreConfig;

pub fn list(store: StoreConfig, limit: usize) -> Result<()> {
    let db = super::open_db(store)?;
    let dlq = db.dead_letter_queue();

    let total = dlq.count().context("Failed to count dead letters")?;
    let events = dlq.list(limit).context("Failed to list dead letters")?;
    if events.is_empty() {
        println!("Dead letter queue is empty");
        return Ok(());
    }

    for event in &events {
        println!(
            "#{} key={} pid={} method={} param={} retries={}",
            event.id,
            event.event_key,
            event.pid,
            event.method,
            event.param.as_deref().unwrap_or("-"),
            event.retry_count
        );
        println!("    failed {}: {}", event.failed_at, event.error_message);
    }
    if total > events.len() {
        println!("\n... {} more", total - events.len());
    }

    Ok(())
}

pub fn remove(store: StoreConfig, id: i64) -> Result<()> {
    let db = super::open_db(store)?;
    let dlq = db.dead_letter_queue();

    if dlq.get(id)?.is_none() {
        bail!("No dead letter with id {}", id);
    }
    dlq.remove(id)?;
    println!("✓ Removed dead letter {}", id);
    Ok(())
}

pub fn clear(store: StoreConfig, force: bool) -> Result<()> {
    let db = super::open_db(store)?;
    let dlq = db.dead_letter_queue();

    let count = dlq.count()?;
    if count == 0 {
        println!("Dead letter queue is empty");
        return Ok(());
    }

    if !force {
        print!("Remove {} dead letter(s)? [y/N] ", count);
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted");
            return Ok(());
        }
    }

    let removed = dlq.clear()?;
    println!("✓ Removed {} dead letter(s)", removed);
    Ok(())
}
