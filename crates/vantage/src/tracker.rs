//! Transaction boundary and event dispatch.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Instant;
use vantage_core::{
    error::Result,
    observe,
    traits::{RecordStore, RecordTxn, Repository},
    EventKey, State, Timestamp, TrackerConfig,
};

use crate::backend::Backend;

/// Outcome of one tracker operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Records and cursor were written in one transaction
    Applied,
    /// The key was at or below the cursor; nothing was written
    Stale { cursor: EventKey },
}

enum Begin<T> {
    Ready(T),
    Stale(EventKey),
}

/// Applies repository change events to the record index.
///
/// Each operation runs in its own store transaction: the backend writes
/// records, then the cursor moves to the event key on commit. Any error
/// rolls the whole transaction back and leaves the cursor where it was.
pub struct UpdateTracker<S, R> {
    store: Arc<S>,
    backend: Backend<R>,
    config: TrackerConfig,
}

impl<S: RecordStore, R: Repository> UpdateTracker<S, R> {
    pub fn new(store: Arc<S>, repository: R) -> Self {
        Self::with_config(store, repository, TrackerConfig::default())
    }

    pub fn with_config(store: Arc<S>, repository: R, config: TrackerConfig) -> Self {
        Self {
            store,
            backend: Backend::new(repository),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn repository(&self) -> &R {
        self.backend.repository()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn cursor(&self) -> Result<Option<EventKey>> {
        self.store.get_cursor()
    }

    /// A new object appeared in the repository.
    pub fn object_created(&self, pid: &str, at: Timestamp, key: EventKey) -> Result<Applied> {
        let start = Instant::now();
        let mut txn = match self.begin(key)? {
            Begin::Ready(txn) => txn,
            Begin::Stale(cursor) => return Ok(self.stale("object_created", pid, key, cursor)),
        };
        let result = self.created(&mut txn, pid, at);
        self.finish(txn, result, "object_created", pid, key, start)
    }

    /// The lifecycle state of `pid` changed. Without an explicit state the
    /// repository is asked for the state as of `at`.
    pub fn object_state_changed(
        &self,
        pid: &str,
        at: Timestamp,
        new_state: Option<State>,
        key: EventKey,
    ) -> Result<Applied> {
        let start = Instant::now();
        let mut txn = match self.begin(key)? {
            Begin::Ready(txn) => txn,
            Begin::Stale(cursor) => {
                return Ok(self.stale("object_state_changed", pid, key, cursor))
            }
        };
        let result = self.state_changed(&mut txn, pid, at, new_state);
        self.finish(txn, result, "object_state_changed", pid, key, start)
    }

    /// `pid` was purged from the repository.
    pub fn object_deleted(&self, pid: &str, at: Timestamp, key: EventKey) -> Result<Applied> {
        let start = Instant::now();
        let mut txn = match self.begin(key)? {
            Begin::Ready(txn) => txn,
            Begin::Stale(cursor) => return Ok(self.stale("object_deleted", pid, key, cursor)),
        };
        let result = self.deleted(&mut txn, pid, at);
        self.finish(txn, result, "object_deleted", pid, key, start)
    }

    /// A datastream of `pid` changed. The view and relations datastreams
    /// are relation changes; anything else only touches records.
    pub fn datastream_changed(
        &self,
        pid: &str,
        at: Timestamp,
        datastream: Option<&str>,
        key: EventKey,
    ) -> Result<Applied> {
        let start = Instant::now();
        let mut txn = match self.begin(key)? {
            Begin::Ready(txn) => txn,
            Begin::Stale(cursor) => return Ok(self.stale("datastream_changed", pid, key, cursor)),
        };
        let result = self.datastream(&mut txn, pid, at, datastream);
        self.finish(txn, result, "datastream_changed", pid, key, start)
    }

    /// Relations of `pid` were added or removed.
    pub fn object_relations_changed(
        &self,
        pid: &str,
        at: Timestamp,
        key: EventKey,
    ) -> Result<Applied> {
        let start = Instant::now();
        let mut txn = match self.begin(key)? {
            Begin::Ready(txn) => txn,
            Begin::Stale(cursor) => {
                return Ok(self.stale("object_relations_changed", pid, key, cursor))
            }
        };
        let result = self.relations_changed(&mut txn, pid, at);
        self.finish(txn, result, "object_relations_changed", pid, key, start)
    }

    /// Advance the cursor past `key` without touching any record.
    pub fn skip(&self, key: EventKey) -> Result<Applied> {
        let start = Instant::now();
        let txn = match self.begin(key)? {
            Begin::Ready(txn) => txn,
            Begin::Stale(cursor) => return Ok(self.stale("skip", "", key, cursor)),
        };
        self.finish(txn, Ok(()), "skip", "", key, start)
    }

    fn created<T: RecordTxn>(&self, txn: &mut T, pid: &str, at: Timestamp) -> Result<()> {
        let backend = &self.backend;
        if backend.repository().is_content_model(pid, at)? {
            return backend.content_model_changed(txn, pid, at);
        }
        self.set_state(txn, pid, at, State::Inactive)?;
        backend.modify_relations(txn, pid, at)?;
        backend.touch(txn, pid, at)
    }

    fn state_changed<T: RecordTxn>(
        &self,
        txn: &mut T,
        pid: &str,
        at: Timestamp,
        new_state: Option<State>,
    ) -> Result<()> {
        let backend = &self.backend;
        let state = match new_state {
            Some(state) => state,
            None => backend.repository().state(pid, at)?,
        };
        if state == State::Deleted {
            let was_cm = backend.repository().is_content_model(pid, at)?;
            backend.modify_state(txn, pid, at, None, State::Deleted)?;
            if was_cm {
                backend.content_model_changed(txn, pid, at)?;
            }
            return Ok(());
        }
        self.set_state(txn, pid, at, state)?;
        backend.touch(txn, pid, at)
    }

    fn deleted<T: RecordTxn>(&self, txn: &mut T, pid: &str, at: Timestamp) -> Result<()> {
        let backend = &self.backend;
        // the object is gone at `at`, so ask about the instant before
        let before = at - ChronoDuration::milliseconds(1);
        if backend.repository().is_content_model(pid, before)? {
            backend.content_model_changed(txn, pid, at)?;
        }
        backend.modify_state(txn, pid, at, None, State::Deleted)
    }

    fn datastream<T: RecordTxn>(
        &self,
        txn: &mut T,
        pid: &str,
        at: Timestamp,
        datastream: Option<&str>,
    ) -> Result<()> {
        let backend = &self.backend;
        match datastream {
            Some(ds) if ds == self.config.view_datastream => {
                if backend.repository().is_content_model(pid, at)? {
                    backend.content_model_changed(txn, pid, at)
                } else {
                    backend.modify_relations(txn, pid, at)?;
                    backend.touch(txn, pid, at)
                }
            }
            Some(ds) if ds == self.config.relations_datastream => {
                self.relations_changed(txn, pid, at)
            }
            _ => backend.touch(txn, pid, at),
        }
    }

    fn relations_changed<T: RecordTxn>(&self, txn: &mut T, pid: &str, at: Timestamp) -> Result<()> {
        let backend = &self.backend;
        backend.modify_relations(txn, pid, at)?;
        backend.touch(txn, pid, at)?;
        if backend.repository().is_content_model(pid, at)? {
            backend.content_model_changed(txn, pid, at)?;
        }
        Ok(())
    }

    /// Run `modify_state` once per collection of `pid`, or once without a
    /// collection when it belongs to none.
    fn set_state<T: RecordTxn>(
        &self,
        txn: &mut T,
        pid: &str,
        at: Timestamp,
        state: State,
    ) -> Result<()> {
        let collections = self.backend.repository().collections(pid, at)?;
        if collections.is_empty() {
            return self.backend.modify_state(txn, pid, at, None, state);
        }
        for collection in &collections {
            self.backend
                .modify_state(txn, pid, at, Some(collection.as_str()), state)?;
        }
        Ok(())
    }

    fn begin(&self, key: EventKey) -> Result<Begin<S::Txn<'_>>> {
        let txn = self.store.begin_txn()?;
        match txn.cursor()? {
            Some(cursor) if key <= cursor => {
                Box::new(txn).rollback();
                Ok(Begin::Stale(cursor))
            }
            _ => Ok(Begin::Ready(txn)),
        }
    }

    fn stale(&self, op: &'static str, pid: &str, key: EventKey, cursor: EventKey) -> Applied {
        tracing::debug!(op, pid, key, cursor, "Ignoring stale event");
        observe::record_stale_event();
        Applied::Stale { cursor }
    }

    fn finish(
        &self,
        txn: S::Txn<'_>,
        result: Result<()>,
        op: &'static str,
        pid: &str,
        key: EventKey,
        start: Instant,
    ) -> Result<Applied> {
        match result {
            Ok(()) => {
                Box::new(txn).commit(key)?;
                tracing::debug!(op, pid, key, "Applied event");
                observe::record_event_applied(op, start.elapsed());
                Ok(Applied::Applied)
            }
            Err(e) => {
                Box::new(txn).rollback();
                tracing::warn!(op, pid, key, error = %e, "Event rolled back");
                observe::record_event_failed(e.is_retryable());
                Err(e)
            }
        }
    }
}
