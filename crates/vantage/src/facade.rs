//! Consumer-facing query surface over the record index.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use vantage_core::{
    error::{Result, VantageError},
    from_millis, observe, to_millis, traits::RecordStore, ChangedRecord,
    LookupQuery, StateFilter,
};
use vantage_sqlite::{queries, SqliteRecordStore};

/// One lookup row in the wire shape consumers expect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedEntry {
    pub entry_pid: String,
    pub collection_pid: String,
    pub last_changed_time: i64,
    /// `A`, `I` or `D`
    pub state: String,
}

impl From<ChangedRecord> for ChangedEntry {
    fn from(row: ChangedRecord) -> Self {
        Self {
            entry_pid: row.entry_pid,
            collection_pid: row.collection,
            last_changed_time: to_millis(row.last_changed),
            state: row.state.code().to_string(),
        }
    }
}

/// Async "changed since" queries, served from the read pool when one is
/// configured and from the writer connection otherwise.
#[derive(Clone)]
pub struct QueryFacade {
    store: Arc<SqliteRecordStore>,
}

impl QueryFacade {
    pub fn new(store: Arc<SqliteRecordStore>) -> Self {
        Self { store }
    }

    /// Records of `view_angle` in `collection` changed at or after
    /// `since_millis`, paged by `offset`/`limit`.
    ///
    /// `state` is `A`, `I`, `D` or absent; anything else is rejected.
    pub async fn lookup(
        &self,
        since_millis: i64,
        view_angle: &str,
        offset: usize,
        limit: usize,
        state: Option<&str>,
        collection: &str,
    ) -> Result<Vec<ChangedEntry>> {
        let filter = StateFilter::from_param(state)?;
        let query = LookupQuery::new(from_millis(since_millis)?, view_angle, collection)
            .with_filter(filter)
            .with_page(offset, limit);

        let start = Instant::now();
        let rows = match self.store.read_pool() {
            Some(pool) => {
                let conn = pool.acquire().await?;
                queries::lookup(conn.connection(), &query)?
            }
            None => {
                let store = self.store.clone();
                let query = query.clone();
                off_runtime(move || store.lookup(&query)).await?
            }
        };
        observe::record_lookup(start.elapsed(), rows.len());
        tracing::debug!(
            view_angle,
            collection,
            since_millis,
            ?filter,
            rows = rows.len(),
            "lookup"
        );

        Ok(rows.into_iter().map(ChangedEntry::from).collect())
    }

    /// Newest change time among matching records in epoch milliseconds,
    /// or 0 when nothing matches.
    pub async fn latest_modification_time(
        &self,
        collection: &str,
        view_angle: &str,
        state: Option<&str>,
    ) -> Result<i64> {
        let filter = StateFilter::from_param(state)?;
        let latest = match self.store.read_pool() {
            Some(pool) => {
                let conn = pool.acquire().await?;
                queries::latest_modification_time(conn.connection(), collection, view_angle, filter)?
            }
            None => {
                let store = self.store.clone();
                let (collection, view_angle) = (collection.to_string(), view_angle.to_string());
                off_runtime(move || store.latest_modification_time(&collection, &view_angle, filter))
                    .await?
            }
        };
        Ok(latest.map(to_millis).unwrap_or(0))
    }
}

/// Run a writer-connection query on the blocking pool. The writer mutex is
/// held for a whole tracker event, so waiting on it must not stall the runtime.
async fn off_runtime<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VantageError::InvalidState(format!("query task failed: {}", e)))?
}
