//! Work-log processor
//!
//! Polls an [`EventFeed`] from the tracker's cursor and applies units
//! strictly in key order. The cursor is the only record of progress, so
//! a unit is never applied before every lower key has been applied or
//! deliberately skipped.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vantage_core::{
    error::{Result, VantageError},
    observe,
    traits::{RecordStore, Repository},
    MalformedEventPolicy, ProcessorConfig, WorkLogUnit,
};

use crate::dead_letter_queue::DeadLetterQueue;
use crate::tracker::{Applied, UpdateTracker};
use crate::worklog::{normalize_pid, EventFeed, TrackerEvent};

/// Action to take after a failed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Stop the batch; the same unit is retried after a back-off
    Retry,
    /// Stop processing and surface the error
    Stop,
    /// Dead-letter the unit and advance past it
    DeadLetter,
}

/// Builder for work-log processors
///
/// # Example
///
/// ```ignore
/// let processor = WorkLogProcessor::builder(feed, tracker)
///     .with_config(ProcessorConfig::default().with_batch_size(500))
///     .with_dead_letter_queue(dlq)
///     .build()?;
///
/// processor.run().await?;
/// ```
pub struct WorkLogProcessorBuilder<F, S, R> {
    feed: F,
    tracker: Arc<UpdateTracker<S, R>>,
    config: ProcessorConfig,
    dlq: Option<Arc<DeadLetterQueue>>,
}

impl<F, S, R> WorkLogProcessorBuilder<F, S, R>
where
    F: EventFeed,
    S: RecordStore,
    R: Repository,
{
    pub fn new(feed: F, tracker: Arc<UpdateTracker<S, R>>) -> Self {
        Self {
            feed,
            tracker,
            config: ProcessorConfig::default(),
            dlq: None,
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedEventPolicy) -> Self {
        self.config.malformed_policy = policy;
        self
    }

    /// Required for `SkipAndAdvance`; without it skipped units are only logged
    pub fn with_dead_letter_queue(mut self, dlq: Arc<DeadLetterQueue>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    /// Fails with `Config` when the settings cannot make progress.
    pub fn build(self) -> Result<WorkLogProcessor<F, S, R>> {
        self.config.validate()?;
        Ok(WorkLogProcessor {
            feed: self.feed,
            tracker: self.tracker,
            config: self.config,
            dlq: self.dlq,
            shutdown: Arc::new(AtomicBool::new(false)),
            failures: 0,
        })
    }
}

/// Continuous work-log processor
pub struct WorkLogProcessor<F, S, R> {
    feed: F,
    tracker: Arc<UpdateTracker<S, R>>,
    config: ProcessorConfig,
    dlq: Option<Arc<DeadLetterQueue>>,
    shutdown: Arc<AtomicBool>,
    failures: u32,
}

impl<F, S, R> WorkLogProcessor<F, S, R>
where
    F: EventFeed,
    S: RecordStore,
    R: Repository,
{
    pub fn builder(feed: F, tracker: Arc<UpdateTracker<S, R>>) -> WorkLogProcessorBuilder<F, S, R> {
        WorkLogProcessorBuilder::new(feed, tracker)
    }

    pub fn tracker(&self) -> &Arc<UpdateTracker<S, R>> {
        &self.tracker
    }

    /// Run until shutdown is signaled or a non-retryable error stops processing
    ///
    /// Retryable failures back off per the configured strategy and retry
    /// the same unit.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            cursor = ?self.tracker.cursor()?,
            batch_size = self.config.batch_size,
            "Work-log processor started"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.process_batch() {
                Ok(0) => tokio::time::sleep(self.config.poll_interval()).await,
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    let delay = self.retry_delay();
                    tracing::warn!(error = %e, ?delay, attempt = self.failures, "Retrying after failure");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Work-log processor stopped");
                    return Err(e);
                }
            }
        }

        tracing::info!("Work-log processor shutdown");
        Ok(())
    }

    /// Run the processor synchronously (blocking)
    pub fn run_blocking(&mut self) -> Result<()> {
        tracing::info!("Work-log processor started (blocking mode)");

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.process_batch() {
                Ok(0) => std::thread::sleep(self.config.poll_interval()),
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    let delay = self.retry_delay();
                    tracing::warn!(error = %e, ?delay, "Retrying after failure");
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Work-log processor stopped");
                    return Err(e);
                }
            }
        }

        tracing::info!("Work-log processor shutdown");
        Ok(())
    }

    /// Process one batch of units after the cursor
    ///
    /// Returns the number of units applied or skipped. Stops at the first
    /// unit that fails and is not dead-lettered, returning its error; the
    /// cursor stays just below that unit.
    pub fn process_batch(&mut self) -> Result<usize> {
        let cursor = self.tracker.cursor()?;
        let units = self.feed.fetch(cursor, self.config.batch_size)?;
        let cutoff = Utc::now()
            .checked_sub_signed(self.config.min_event_age()?)
            .ok_or_else(|| {
                VantageError::Config(format!(
                    "min_event_age_secs {} reaches before the representable range",
                    self.config.min_event_age_secs
                ))
            })?;

        let mut processed = 0;
        for unit in units {
            if unit.happened > cutoff {
                tracing::trace!(key = unit.key, "Unit too young, waiting for next poll");
                break;
            }

            match self.apply(&unit) {
                Ok(_) => processed += 1,
                Err(e) => match self.handle_error(&e, &unit) {
                    ErrorAction::Retry | ErrorAction::Stop => return Err(e),
                    ErrorAction::DeadLetter => {
                        self.dead_letter(&unit, &e)?;
                        processed += 1;
                    }
                },
            }
        }

        if processed > 0 {
            self.failures = 0;
            tracing::debug!(processed, cursor = ?self.tracker.cursor()?, "Processed work-log batch");
        }
        Ok(processed)
    }

    /// Decode and apply one unit through the tracker
    pub fn apply(&self, unit: &WorkLogUnit) -> Result<Applied> {
        let event = TrackerEvent::decode(unit)?;
        if let TrackerEvent::Ignored { method, known } = &event {
            if *known {
                tracing::debug!(key = unit.key, method = %method, "Read-only work-log unit");
            } else {
                tracing::warn!(key = unit.key, method = %method, "Unknown work-log method, ignoring");
            }
            return self.tracker.skip(unit.key);
        }

        let pid = normalize_pid(unit)?;
        let at = unit.happened;
        let key = unit.key;
        match event {
            TrackerEvent::Created => self.tracker.object_created(pid, at, key),
            TrackerEvent::StateChanged(state) => {
                self.tracker.object_state_changed(pid, at, state, key)
            }
            TrackerEvent::Purged => self.tracker.object_deleted(pid, at, key),
            TrackerEvent::DatastreamChanged(ds) => {
                self.tracker.datastream_changed(pid, at, ds.as_deref(), key)
            }
            TrackerEvent::RelationsChanged => self.tracker.object_relations_changed(pid, at, key),
            TrackerEvent::Ignored { .. } => self.tracker.skip(key),
        }
    }

    fn handle_error(&self, error: &VantageError, unit: &WorkLogUnit) -> ErrorAction {
        if error.is_retryable() {
            tracing::warn!(key = unit.key, pid = %unit.pid, error = %error, "Retryable failure");
            return ErrorAction::Retry;
        }
        if error.is_malformed() {
            return match self.config.malformed_policy {
                MalformedEventPolicy::Block => {
                    tracing::error!(
                        key = unit.key,
                        pid = %unit.pid,
                        method = %unit.method,
                        error = %error,
                        "Malformed work-log unit, blocking until resolved"
                    );
                    ErrorAction::Stop
                }
                MalformedEventPolicy::SkipAndAdvance => ErrorAction::DeadLetter,
            };
        }
        tracing::error!(key = unit.key, pid = %unit.pid, error = %error, "Failed to apply unit");
        ErrorAction::Stop
    }

    fn dead_letter(&self, unit: &WorkLogUnit, error: &VantageError) -> Result<()> {
        match &self.dlq {
            Some(dlq) => {
                let id = dlq.add(unit, error)?;
                tracing::warn!(key = unit.key, dlq_id = id, error = %error, "Unit sent to DLQ");
            }
            None => {
                tracing::warn!(key = unit.key, error = %error, "Skipping unit, no DLQ configured");
            }
        }
        observe::record_dead_letter();
        self.tracker.skip(unit.key)?;
        Ok(())
    }

    fn retry_delay(&mut self) -> Duration {
        let delay = self.config.backoff.delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Signal graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Get a handle for shutting down the processor
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Handle for shutting down a work-log processor
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
