//! Shared helpers for integration tests
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tempfile::TempDir;
use vantage::{
    ChangedRecord, LookupQuery, RecordStore, Repository, Result, SqliteRecordStore, State,
    StateFilter, StoreConfig, Timestamp, UpdateTracker, VantageError, ViewBundle,
};

pub fn t(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Default)]
struct Script {
    angles: HashMap<String, BTreeSet<String>>,
    collections: HashMap<String, BTreeSet<String>>,
    bundles: HashMap<(String, String), Vec<String>>,
    /// content model pid -> first instant it no longer is one
    content_models: HashMap<String, Option<Timestamp>>,
    subscribers: HashMap<String, BTreeSet<String>>,
    states: HashMap<String, State>,
    failures: HashMap<&'static str, usize>,
    invalidated: Vec<String>,
}

/// In-memory repository whose answers are set by the test.
///
/// Answers ignore the date, except content models scripted with an end
/// instant. Unscripted entries answer empty sets, a bundle
/// holding only the entry, "not a content model" and ACTIVE.
#[derive(Default)]
pub struct ScriptedRepository {
    script: Mutex<Script>,
}

impl ScriptedRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `pid` an entry for `angles` within `collections`.
    pub fn entry(&self, pid: &str, angles: &[&str], collections: &[&str]) {
        let mut s = self.script.lock();
        s.angles.insert(pid.to_string(), set(angles));
        s.collections.insert(pid.to_string(), set(collections));
    }

    pub fn set_collections(&self, pid: &str, collections: &[&str]) {
        self.script
            .lock()
            .collections
            .insert(pid.to_string(), set(collections));
    }

    pub fn bundle(&self, entry: &str, angle: &str, members: &[&str]) {
        self.script.lock().bundles.insert(
            (entry.to_string(), angle.to_string()),
            members.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn content_model(&self, cm: &str, subscribers: &[&str]) {
        self.script_content_model(cm, subscribers, None);
    }

    /// A content model that stops being one at `until` (purged at that instant).
    pub fn content_model_until(&self, cm: &str, subscribers: &[&str], until: Timestamp) {
        self.script_content_model(cm, subscribers, Some(until));
    }

    fn script_content_model(&self, cm: &str, subscribers: &[&str], until: Option<Timestamp>) {
        let mut s = self.script.lock();
        s.content_models.insert(cm.to_string(), until);
        s.subscribers.insert(cm.to_string(), set(subscribers));
    }

    pub fn set_state(&self, pid: &str, state: State) {
        self.script.lock().states.insert(pid.to_string(), state);
    }

    /// Fail the next `times` calls of `method` with a transient error.
    pub fn fail(&self, method: &'static str, times: usize) {
        self.script.lock().failures.insert(method, times);
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.script.lock().invalidated.clone()
    }

    fn check(&self, method: &'static str) -> Result<()> {
        let mut s = self.script.lock();
        if let Some(remaining) = s.failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(VantageError::transient(format!("{method}: connection reset")));
            }
        }
        Ok(())
    }
}

impl Repository for ScriptedRepository {
    fn entry_angles(&self, pid: &str, _at: Timestamp) -> Result<BTreeSet<String>> {
        self.check("entry_angles")?;
        Ok(self.script.lock().angles.get(pid).cloned().unwrap_or_default())
    }

    fn collections(&self, pid: &str, _at: Timestamp) -> Result<BTreeSet<String>> {
        self.check("collections")?;
        Ok(self
            .script
            .lock()
            .collections
            .get(pid)
            .cloned()
            .unwrap_or_default())
    }

    fn calc_view_bundle(&self, entry: &str, angle: &str, _at: Timestamp) -> Result<ViewBundle> {
        self.check("calc_view_bundle")?;
        let members = self
            .script
            .lock()
            .bundles
            .get(&(entry.to_string(), angle.to_string()))
            .cloned()
            .unwrap_or_else(|| vec![entry.to_string()]);
        Ok(ViewBundle::new(entry, angle, members))
    }

    fn is_content_model(&self, pid: &str, at: Timestamp) -> Result<bool> {
        self.check("is_content_model")?;
        Ok(match self.script.lock().content_models.get(pid) {
            Some(Some(until)) => at < *until,
            Some(None) => true,
            None => false,
        })
    }

    fn objects_of_content_model(&self, cm: &str) -> Result<BTreeSet<String>> {
        self.check("objects_of_content_model")?;
        Ok(self
            .script
            .lock()
            .subscribers
            .get(cm)
            .cloned()
            .unwrap_or_default())
    }

    fn state(&self, pid: &str, _at: Timestamp) -> Result<State> {
        self.check("state")?;
        Ok(self
            .script
            .lock()
            .states
            .get(pid)
            .copied()
            .unwrap_or(State::Active))
    }

    fn invalidate(&self, pid: &str) {
        self.script.lock().invalidated.push(pid.to_string());
    }
}

pub type TestTracker = UpdateTracker<SqliteRecordStore, Arc<ScriptedRepository>>;

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<SqliteRecordStore>,
    pub repo: Arc<ScriptedRepository>,
    pub tracker: Arc<TestTracker>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store =
            Arc::new(SqliteRecordStore::open(StoreConfig::new(dir.path().join("index.db"))).unwrap());
        let repo = ScriptedRepository::new();
        let tracker = Arc::new(UpdateTracker::new(store.clone(), repo.clone()));
        Self {
            dir,
            store,
            repo,
            tracker,
        }
    }

    pub fn lookup(&self, since: Timestamp, angle: &str, filter: StateFilter, collection: &str) -> Vec<ChangedRecord> {
        self.store
            .lookup(&LookupQuery::new(since, angle, collection).with_filter(filter))
            .unwrap()
    }

    pub fn record(&self, entry: &str, angle: &str, collection: &str) -> Option<vantage::Record> {
        self.store
            .get(&vantage::RecordKey::new(entry, angle, collection))
            .unwrap()
    }
}
