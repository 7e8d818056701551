//! Optional metrics instrumentation for Vantage.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

use std::time::Duration;

/// Record an applied tracker operation.
///
/// - `vantage.events.applied_total` – counter with `op` label
/// - `vantage.events.apply_duration_seconds` – histogram with `op` label
#[inline]
pub fn record_event_applied(op: &'static str, duration: Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vantage.events.applied_total", "op" => op).increment(1);
        metrics::histogram!("vantage.events.apply_duration_seconds", "op" => op)
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (op, duration);
    }
}

/// Record an event ignored because its key is at or below the cursor.
///
/// - `vantage.events.stale_total` – counter
#[inline]
pub fn record_stale_event() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vantage.events.stale_total").increment(1);
    }
}

/// Record an event that failed and was rolled back.
///
/// - `vantage.events.failed_total` – counter with `retryable` label
#[inline]
pub fn record_event_failed(retryable: bool) {
    #[cfg(feature = "observe")]
    {
        let retryable = if retryable { "true" } else { "false" };
        metrics::counter!("vantage.events.failed_total", "retryable" => retryable).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = retryable;
    }
}

/// Record an event moved to the dead-letter queue.
///
/// - `vantage.events.dead_lettered_total` – counter
#[inline]
pub fn record_dead_letter() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vantage.events.dead_lettered_total").increment(1);
    }
}

/// Record a store commit (counter + latency histogram).
///
/// - `vantage.store.commits_total` – counter
/// - `vantage.store.commit_duration_seconds` – histogram
#[inline]
pub fn record_commit(duration: Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vantage.store.commits_total").increment(1);
        metrics::histogram!("vantage.store.commit_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}

/// Record a lookup query.
///
/// - `vantage.lookup.total` – counter
/// - `vantage.lookup.duration_seconds` – histogram
/// - `vantage.lookup.rows_total` – counter
#[inline]
pub fn record_lookup(duration: Duration, rows: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vantage.lookup.total").increment(1);
        metrics::histogram!("vantage.lookup.duration_seconds").record(duration.as_secs_f64());
        metrics::counter!("vantage.lookup.rows_total").increment(rows as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, rows);
    }
}

/// Record a repository cache hit or miss.
///
/// - `vantage.cache.lookups_total` – counter with `cache` and `result` labels
#[inline]
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    #[cfg(feature = "observe")]
    {
        let result = if hit { "hit" } else { "miss" };
        metrics::counter!("vantage.cache.lookups_total", "cache" => cache, "result" => result)
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (cache, hit);
    }
}
