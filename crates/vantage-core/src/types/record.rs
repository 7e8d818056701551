//! The persisted record aggregate and its derived lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VantageError};

/// Point in time, millisecond precision once persisted.
pub type Timestamp = DateTime<Utc>;

/// Convert a timestamp to epoch milliseconds.
pub fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

/// Convert epoch milliseconds back to a timestamp.
pub fn from_millis(millis: i64) -> Result<Timestamp> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        VantageError::InvalidArgument(format!("timestamp out of range: {} ms", millis))
    })
}

/// Lifecycle state derived from a record's three timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Active,
    Inactive,
    Deleted,
}

impl State {
    /// Single-letter wire code: `A`, `I` or `D`.
    pub fn code(&self) -> &'static str {
        match self {
            State::Active => "A",
            State::Inactive => "I",
            State::Deleted => "D",
        }
    }

    /// Derive the state from the three lifecycle timestamps.
    ///
    /// Absent timestamps sort before every present one (`Option`'s own
    /// ordering). Ties between active and inactive go to ACTIVE, ties
    /// involving deleted go to DELETED.
    pub fn derive(
        active: Option<Timestamp>,
        inactive: Option<Timestamp>,
        deleted: Option<Timestamp>,
    ) -> State {
        if inactive > active && inactive > deleted {
            State::Inactive
        } else if active >= inactive && active > deleted {
            State::Active
        } else if deleted >= active && deleted >= inactive {
            State::Deleted
        } else {
            State::Inactive
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for State {
    type Err = VantageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "ACTIVE" => Ok(State::Active),
            "I" | "INACTIVE" => Ok(State::Inactive),
            "D" | "DELETED" => Ok(State::Deleted),
            other => Err(VantageError::InvalidArgument(format!(
                "unknown state '{}'",
                other
            ))),
        }
    }
}

/// Identity of a record: one entry object seen through one view angle in one collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub entry_pid: String,
    pub view_angle: String,
    pub collection: String,
}

impl RecordKey {
    pub fn new(
        entry_pid: impl Into<String>,
        view_angle: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            entry_pid: entry_pid.into(),
            view_angle: view_angle.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.entry_pid, self.view_angle, self.collection
        )
    }
}

/// A tracked record.
///
/// Every mutator is a max-merge keyed on the event date, so applying the
/// same event twice, or a set of events in any order, converges on the
/// same timestamps. Mutators return `true` when something changed and the
/// record needs saving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    pub active: Option<Timestamp>,
    pub inactive: Option<Timestamp>,
    pub deleted: Option<Timestamp>,
    pub objects: BTreeSet<String>,
    pub last_modified: Option<Timestamp>,
}

impl Record {
    /// A freshly discovered record whose bundle holds only its entry.
    pub fn new(key: RecordKey) -> Self {
        let mut objects = BTreeSet::new();
        objects.insert(key.entry_pid.clone());
        Self {
            key,
            active: None,
            inactive: None,
            deleted: None,
            objects,
            last_modified: None,
        }
    }

    pub fn entry_pid(&self) -> &str {
        &self.key.entry_pid
    }

    pub fn state(&self) -> State {
        State::derive(self.active, self.inactive, self.deleted)
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == State::Deleted
    }

    /// The timestamp the current state was selected by: the newest present one.
    pub fn change_time(&self) -> Option<Timestamp> {
        self.active.max(self.inactive).max(self.deleted)
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.objects.contains(pid)
    }

    pub fn merge_active(&mut self, at: Timestamp) -> bool {
        let changed = merge_live(&mut self.active, self.deleted, at);
        self.after_live_write(changed, at)
    }

    pub fn merge_inactive(&mut self, at: Timestamp) -> bool {
        let changed = merge_live(&mut self.inactive, self.deleted, at);
        self.after_live_write(changed, at)
    }

    /// Bump whichever timestamp the record is currently open under.
    ///
    /// ACTIVE records move `active`, anything else not deleted moves
    /// `inactive`. Deleted records are left alone.
    pub fn bump_open(&mut self, at: Timestamp) -> bool {
        match self.state() {
            State::Active => self.merge_active(at),
            State::Inactive => self.merge_inactive(at),
            State::Deleted => false,
        }
    }

    /// Mark the record deleted as of `at`.
    ///
    /// `deleted` is max-merged. Live timestamps not newer than `at` are
    /// cleared; the membership set is emptied only once no live timestamp
    /// survives, so a delete that arrives after a newer revival does not
    /// wipe the revived record.
    pub fn tombstone(&mut self, at: Timestamp) -> bool {
        let mut changed = false;
        if self.deleted.map_or(true, |d| at > d) {
            self.deleted = Some(at);
            changed = true;
        }
        let cutoff = self.deleted;
        for slot in [&mut self.active, &mut self.inactive] {
            if slot.is_some() && *slot <= cutoff {
                *slot = None;
                changed = true;
            }
        }
        if self.active.is_none() && self.inactive.is_none() && !self.objects.is_empty() {
            self.objects.clear();
            changed = true;
        }
        if changed {
            self.touch_modified(at);
        }
        changed
    }

    /// Replace the membership set with a freshly computed bundle.
    ///
    /// The entry pid is always kept. A changed set also bumps the open
    /// timestamp so the record resurfaces in "changed since" scans.
    pub fn replace_objects(&mut self, mut objects: BTreeSet<String>, at: Timestamp) -> bool {
        objects.insert(self.key.entry_pid.clone());
        if objects == self.objects {
            return false;
        }
        self.objects = objects;
        self.bump_open(at);
        self.touch_modified(at);
        true
    }

    fn after_live_write(&mut self, changed: bool, at: Timestamp) -> bool {
        if changed {
            // a live write newer than the tombstone revives the record
            self.objects.insert(self.key.entry_pid.clone());
            self.touch_modified(at);
        }
        changed
    }

    fn touch_modified(&mut self, at: Timestamp) {
        if self.last_modified.map_or(true, |m| at > m) {
            self.last_modified = Some(at);
        }
    }
}

fn merge_live(slot: &mut Option<Timestamp>, deleted: Option<Timestamp>, at: Timestamp) -> bool {
    if deleted.is_some_and(|d| at <= d) {
        return false;
    }
    if slot.is_some_and(|current| current >= at) {
        return false;
    }
    *slot = Some(at);
    true
}
