//! Per-event index maintenance.
//!
//! The backend turns one repository change into record writes inside a
//! caller-owned transaction. It never commits; the tracker owns the
//! transaction boundary and the cursor.

use std::collections::BTreeSet;
use vantage_core::{
    error::Result,
    traits::{RecordTxn, Repository},
    Record, RecordKey, State, Timestamp,
};

pub struct Backend<R> {
    repository: R,
}

impl<R: Repository> Backend<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Apply a lifecycle change of `pid` as of `at`.
    ///
    /// With a collection and a live state, records for every entry angle
    /// of `pid` in that collection are discovered first. Then every record
    /// headed by `pid` gets the new state max-merged in. DELETED also
    /// drops `pid` from every bundle it is a member of.
    pub fn modify_state<T: RecordTxn + ?Sized>(
        &self,
        txn: &mut T,
        pid: &str,
        at: Timestamp,
        collection: Option<&str>,
        state: State,
    ) -> Result<()> {
        tracing::debug!(pid, %at, ?collection, %state, "modify state");

        if state == State::Deleted {
            return self.delete_object(txn, pid, at);
        }

        let mut records = txn.all_with_entry_pid(pid)?;
        if let Some(collection) = collection {
            for angle in self.repository.entry_angles(pid, at)? {
                let key = RecordKey::new(pid, angle, collection);
                if !records.iter().any(|r| r.key == key) {
                    tracing::debug!(record = %key, "discovered record");
                    records.push(Record::new(key));
                }
            }
        }

        for mut record in records {
            let changed = match state {
                State::Active => record.merge_active(at),
                _ => record.merge_inactive(at),
            };
            if changed {
                txn.save(&record)?;
            } else {
                tracing::debug!(record = %record.key, "state change older than record, skipped");
            }
        }

        Ok(())
    }

    fn delete_object<T: RecordTxn + ?Sized>(
        &self,
        txn: &mut T,
        pid: &str,
        at: Timestamp,
    ) -> Result<()> {
        // bundles of other entries that still list the purged object
        for record in txn.all_containing_pid(pid)? {
            if record.entry_pid() != pid && !record.is_deleted() {
                self.recalculate(txn, record, at, Some(pid))?;
            }
        }

        for mut record in txn.all_with_entry_pid(pid)? {
            if record.tombstone(at) {
                tracing::debug!(record = %record.key, "tombstoned record");
                txn.save(&record)?;
            }
        }

        Ok(())
    }

    /// Repair every record affected by a relation change of `pid`.
    ///
    /// Records for new (angle, collection) pairs are created, records
    /// outside the current pairs are tombstoned, and every live record
    /// that has `pid` as entry or member gets its bundle recomputed.
    pub fn modify_relations<T: RecordTxn + ?Sized>(
        &self,
        txn: &mut T,
        pid: &str,
        at: Timestamp,
    ) -> Result<()> {
        let angles = self.repository.entry_angles(pid, at)?;
        let collections = self.repository.collections(pid, at)?;
        tracing::debug!(pid, %at, ?angles, ?collections, "modify relations");

        for angle in &angles {
            for collection in &collections {
                let key = RecordKey::new(pid, angle.as_str(), collection.as_str());
                if txn.get(&key)?.is_none() {
                    let mut record = Record::new(key);
                    record.merge_inactive(at);
                    tracing::debug!(record = %record.key, "discovered record");
                    txn.save(&record)?;
                }
            }
        }

        for mut record in txn.not_in_collections_or_angles(pid, &angles, &collections)? {
            if !record.is_deleted() && record.tombstone(at) {
                tracing::debug!(record = %record.key, "retired record");
                txn.save(&record)?;
            }
        }

        let mut seen = BTreeSet::new();
        let mut affected = txn.all_with_entry_pid(pid)?;
        affected.extend(txn.all_containing_pid(pid)?);
        for record in affected {
            if record.is_deleted() || !seen.insert(record.key.clone()) {
                continue;
            }
            self.recalculate(txn, record, at, None)?;
        }

        Ok(())
    }

    /// Bump every live record containing `pid` without touching membership.
    pub fn touch<T: RecordTxn + ?Sized>(&self, txn: &mut T, pid: &str, at: Timestamp) -> Result<()> {
        for mut record in txn.all_containing_pid(pid)? {
            if record.bump_open(at) {
                txn.save(&record)?;
            }
        }
        Ok(())
    }

    /// Re-derive records of every object governed by content model `cm_pid`.
    pub fn content_model_changed<T: RecordTxn + ?Sized>(
        &self,
        txn: &mut T,
        cm_pid: &str,
        at: Timestamp,
    ) -> Result<()> {
        self.repository.invalidate(cm_pid);
        let subscribers = self.repository.objects_of_content_model(cm_pid)?;
        tracing::info!(
            content_model = cm_pid,
            subscribers = subscribers.len(),
            "Cascading content model change"
        );

        for pid in &subscribers {
            self.modify_relations(txn, pid, at)?;
            self.touch(txn, pid, at)?;
        }
        Ok(())
    }

    fn recalculate<T: RecordTxn + ?Sized>(
        &self,
        txn: &mut T,
        mut record: Record,
        at: Timestamp,
        exclude: Option<&str>,
    ) -> Result<()> {
        let bundle =
            self.repository
                .calc_view_bundle(record.entry_pid(), &record.key.view_angle, at)?;
        let mut members = bundle.member_set();
        if let Some(pid) = exclude {
            members.remove(pid);
        }

        if record.replace_objects(members, at) {
            tracing::debug!(
                record = %record.key,
                members = record.objects.len(),
                "view bundle changed"
            );
            txn.save(&record)?;
        }
        Ok(())
    }
}
