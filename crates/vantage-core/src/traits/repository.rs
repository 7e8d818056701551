use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{State, Timestamp, ViewBundle};

/// The object repository the index is derived from.
///
/// Every question is asked as of a point in time. Implementations report
/// communication failures as retryable [`VantageError::Repository`]
/// errors so the caller can roll back and try again.
///
/// [`VantageError::Repository`]: crate::error::VantageError::Repository
pub trait Repository: Send + Sync {
    /// View angles `pid` is an entry object for.
    fn entry_angles(&self, pid: &str, at: Timestamp) -> Result<BTreeSet<String>>;

    /// Collections `pid` belongs to.
    fn collections(&self, pid: &str, at: Timestamp) -> Result<BTreeSet<String>>;

    /// The full, transitively closed membership of one entry under one angle.
    fn calc_view_bundle(&self, entry_pid: &str, view_angle: &str, at: Timestamp)
        -> Result<ViewBundle>;

    fn is_content_model(&self, pid: &str, at: Timestamp) -> Result<bool>;

    /// Objects whose view angles are governed by `cm_pid`.
    fn objects_of_content_model(&self, cm_pid: &str) -> Result<BTreeSet<String>>;

    fn state(&self, pid: &str, at: Timestamp) -> Result<State>;

    /// Drop anything remembered about `pid`. No-op for uncached repositories.
    fn invalidate(&self, _pid: &str) {}
}

impl<R: Repository + ?Sized> Repository for Arc<R> {
    fn entry_angles(&self, pid: &str, at: Timestamp) -> Result<BTreeSet<String>> {
        (**self).entry_angles(pid, at)
    }

    fn collections(&self, pid: &str, at: Timestamp) -> Result<BTreeSet<String>> {
        (**self).collections(pid, at)
    }

    fn calc_view_bundle(
        &self,
        entry_pid: &str,
        view_angle: &str,
        at: Timestamp,
    ) -> Result<ViewBundle> {
        (**self).calc_view_bundle(entry_pid, view_angle, at)
    }

    fn is_content_model(&self, pid: &str, at: Timestamp) -> Result<bool> {
        (**self).is_content_model(pid, at)
    }

    fn objects_of_content_model(&self, cm_pid: &str) -> Result<BTreeSet<String>> {
        (**self).objects_of_content_model(cm_pid)
    }

    fn state(&self, pid: &str, at: Timestamp) -> Result<State> {
        (**self).state(pid, at)
    }

    fn invalidate(&self, pid: &str) {
        (**self).invalidate(pid)
    }
}
