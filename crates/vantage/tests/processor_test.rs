mod common;

use chrono::Utc;
use common::{set, t, Harness};
use std::sync::Arc;
use std::time::Duration;
use vantage::{
    BackoffStrategy, DeadLetterQueue, MalformedEventPolicy, MemoryFeed, ProcessorConfig,
    RecordStore, State, Timestamp, VantageError, WorkLogProcessor, WorkLogUnit,
};

fn unit(key: u64, pid: &str, method: &str, param: Option<&str>, at: Timestamp) -> WorkLogUnit {
    WorkLogUnit::new(key, pid, method, param.map(str::to_string), at)
}

fn fast_config() -> ProcessorConfig {
    ProcessorConfig::default()
        .with_poll_interval_ms(10)
        .with_backoff(BackoffStrategy::Fixed { delay_ms: 10 })
}

#[test]
fn test_units_apply_in_key_order() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    h.repo.bundle("p1", "V", &["p1", "m1"]);

    let feed = MemoryFeed::new();
    // pushed out of order; the feed hands them back by key
    feed.push(unit(3, "p1", "modifyObject", Some("A"), t(3)));
    feed.push(unit(1, "info:fedora/p1", "ingest", None, t(1)));
    feed.push(unit(2, "p1", "addRelationship", None, t(2)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone())
        .with_config(fast_config())
        .build().unwrap();
    assert_eq!(processor.process_batch().unwrap(), 3);
    assert_eq!(processor.process_batch().unwrap(), 0);

    assert_eq!(h.store.get_cursor().unwrap(), Some(3));
    let record = h.record("p1", "V", "C").unwrap();
    assert_eq!(record.state(), State::Active);
    assert_eq!(record.objects, set(&["p1", "m1"]));
    assert_eq!(record.active, Some(t(3)));
}

#[test]
fn test_batch_size_limits_each_pass() {
    let h = Harness::new();
    let feed = MemoryFeed::new();
    for key in 1..=5 {
        feed.push(unit(key, "p1", "getNextPID", None, t(key as i64)));
    }

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone())
        .with_batch_size(2)
        .build().unwrap();
    assert_eq!(processor.process_batch().unwrap(), 2);
    assert_eq!(h.store.get_cursor().unwrap(), Some(2));
    assert_eq!(processor.process_batch().unwrap(), 2);
    assert_eq!(processor.process_batch().unwrap(), 1);
    assert_eq!(h.store.get_cursor().unwrap(), Some(5));
}

#[test]
fn test_read_only_and_unknown_methods_only_advance() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    let feed = MemoryFeed::new();
    feed.push(unit(1, "p1", "getRelationships", None, t(1)));
    feed.push(unit(2, "p1", "exportObject", None, t(2)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone()).build().unwrap();
    assert_eq!(processor.process_batch().unwrap(), 2);
    assert_eq!(h.store.get_cursor().unwrap(), Some(2));
    assert_eq!(h.store.stats().unwrap().records, 0);
}

#[test]
fn test_malformed_unit_blocks_by_default() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    h.repo.entry("p2", &["V"], &["C"]);
    let feed = MemoryFeed::new();
    feed.push(unit(1, "p1", "ingest", None, t(1)));
    feed.push(unit(2, "p1", "modifyObject", Some("X"), t(2)));
    feed.push(unit(3, "p2", "ingest", None, t(3)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone()).build().unwrap();
    let err = processor.process_batch().unwrap_err();
    assert!(err.is_malformed());
    assert_eq!(h.store.get_cursor().unwrap(), Some(1));

    // nothing past the bad unit is ever applied
    assert!(processor.process_batch().unwrap_err().is_malformed());
    assert_eq!(h.store.get_cursor().unwrap(), Some(1));
    assert!(h.record("p2", "V", "C").is_none());
}

#[test]
fn test_malformed_unit_skipped_into_dead_letter_queue() {
    let h = Harness::new();
    h.repo.entry("p2", &["V"], &["C"]);
    let dlq = Arc::new(DeadLetterQueue::new(h.store.conn().clone()).unwrap());
    let feed = MemoryFeed::new();
    feed.push(unit(1, "   ", "ingest", None, t(1)));
    feed.push(unit(2, "p2", "ingest", None, t(2)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone())
        .with_malformed_policy(MalformedEventPolicy::SkipAndAdvance)
        .with_dead_letter_queue(dlq.clone())
        .build().unwrap();
    assert_eq!(processor.process_batch().unwrap(), 2);

    assert_eq!(h.store.get_cursor().unwrap(), Some(2));
    assert!(h.record("p2", "V", "C").is_some());
    assert_eq!(dlq.count().unwrap(), 1);
    let failed = &dlq.list(10).unwrap()[0];
    assert_eq!(failed.event_key, 1);
    assert_eq!(failed.method, "ingest");
    assert!(failed.error_message.contains("empty pid"));
}

#[test]
fn test_retryable_failure_keeps_the_unit() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    h.repo.fail("collections", 1);
    let feed = MemoryFeed::new();
    feed.push(unit(1, "p1", "ingest", None, t(1)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone()).build().unwrap();
    let err = processor.process_batch().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.store.get_cursor().unwrap(), None);

    assert_eq!(processor.process_batch().unwrap(), 1);
    assert_eq!(h.store.get_cursor().unwrap(), Some(1));
    assert!(h.record("p1", "V", "C").is_some());
}

#[test]
fn test_young_units_wait_for_min_age() {
    let h = Harness::new();
    let feed = MemoryFeed::new();
    feed.push(unit(1, "p1", "getNextPID", None, t(1)));
    feed.push(unit(2, "p1", "getNextPID", None, Utc::now()));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone())
        .with_config(ProcessorConfig::default().with_min_event_age_secs(3600))
        .build().unwrap();
    assert_eq!(processor.process_batch().unwrap(), 1);
    assert_eq!(processor.process_batch().unwrap(), 0);
    assert_eq!(h.store.get_cursor().unwrap(), Some(1));
}

#[test]
fn test_resumes_from_committed_cursor() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    h.tracker.object_created("p1", t(1), 1).unwrap();

    let feed = MemoryFeed::new();
    // key 1 already applied; replaying it with a later date must not land
    feed.push(unit(1, "p1", "modifyObject", Some("D"), t(9)));
    feed.push(unit(2, "p1", "modifyObject", Some("A"), t(2)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone()).build().unwrap();
    assert_eq!(processor.process_batch().unwrap(), 1);
    assert_eq!(h.record("p1", "V", "C").unwrap().state(), State::Active);
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let h = Harness::new();
    h.repo.entry("p1", &["V"], &["C"]);
    let feed = MemoryFeed::new();
    feed.push(unit(1, "p1", "ingest", None, t(1)));
    feed.push(unit(2, "p1", "modifyObject", Some("A"), t(2)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone())
        .with_config(fast_config())
        .build().unwrap();
    let handle = processor.shutdown_handle();
    let task = tokio::spawn(async move { processor.run().await });

    let mut cursor = None;
    for _ in 0..200 {
        cursor = h.store.get_cursor().unwrap();
        if cursor == Some(2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(cursor, Some(2));

    handle.shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(h.record("p1", "V", "C").unwrap().state(), State::Active);
}

#[tokio::test]
async fn test_run_stops_on_blocked_unit() {
    let h = Harness::new();
    let feed = MemoryFeed::new();
    feed.push(unit(1, "p1", "modifyObject", Some("bogus"), t(1)));

    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone())
        .with_config(fast_config())
        .build().unwrap();
    let err = processor.run().await.unwrap_err();
    assert!(err.is_malformed());
    assert_eq!(h.store.get_cursor().unwrap(), None);
}

#[test]
fn test_builder_rejects_unusable_config() {
    let h = Harness::new();

    let zero_batch = WorkLogProcessor::builder(MemoryFeed::new(), h.tracker.clone())
        .with_batch_size(0)
        .build();
    assert!(matches!(zero_batch, Err(VantageError::Config(_))));

    // larger than chrono can represent as a delta
    let ancient = WorkLogProcessor::builder(MemoryFeed::new(), h.tracker.clone())
        .with_config(ProcessorConfig::default().with_min_event_age_secs(1u64 << 62))
        .build();
    assert!(matches!(ancient, Err(VantageError::Config(_))));

    let wrapped = WorkLogProcessor::builder(MemoryFeed::new(), h.tracker.clone())
        .with_config(ProcessorConfig::default().with_min_event_age_secs(u64::MAX))
        .build();
    assert!(matches!(wrapped, Err(VantageError::Config(_))));
}

#[test]
fn test_large_but_valid_min_age_holds_everything_back() {
    let h = Harness::new();
    let feed = MemoryFeed::new();
    feed.push(unit(1, "p1", "getNextPID", None, t(1)));

    // a century of required age
    let mut processor = WorkLogProcessor::builder(feed, h.tracker.clone())
        .with_config(ProcessorConfig::default().with_min_event_age_secs(100 * 365 * 24 * 3600))
        .build()
        .unwrap();
    assert_eq!(processor.process_batch().unwrap(), 0);
    assert_eq!(h.store.get_cursor().unwrap(), None);
}
