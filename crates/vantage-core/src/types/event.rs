use serde::{Deserialize, Serialize};

use super::record::Timestamp;

/// Monotonic key of an entry in the change feed.
pub type EventKey = u64;

/// One raw entry of the repository's work log, as read from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLogUnit {
    pub key: EventKey,
    pub pid: String,
    pub method: String,
    pub param: Option<String>,
    pub happened: Timestamp,
}

impl WorkLogUnit {
    pub fn new(
        key: EventKey,
        pid: impl Into<String>,
        method: impl Into<String>,
        param: Option<String>,
        happened: Timestamp,
    ) -> Self {
        Self {
            key,
            pid: pid.into(),
            method: method.into(),
            param,
            happened,
        }
    }
}
