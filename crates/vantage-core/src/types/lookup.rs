//! Parameters and results of "changed since" lookups.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::record::{State, Timestamp};
use crate::error::{Result, VantageError};

/// Which lifecycle timestamps qualify a record for a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StateFilter {
    /// `active` or `deleted`
    Active,
    /// `inactive` or `deleted`
    Inactive,
    /// `deleted` only
    Deleted,
    /// any of the three
    #[default]
    Any,
}

impl StateFilter {
    /// Parse the optional wire form: `A`, `I`, `D`, or absent for any.
    pub fn from_param(param: Option<&str>) -> Result<Self> {
        match param {
            None => Ok(StateFilter::Any),
            Some(s) if s.trim().is_empty() => Ok(StateFilter::Any),
            Some(s) => s.parse(),
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            StateFilter::Active => Some("A"),
            StateFilter::Inactive => Some("I"),
            StateFilter::Deleted => Some("D"),
            StateFilter::Any => None,
        }
    }
}

impl FromStr for StateFilter {
    type Err = VantageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "A" => Ok(StateFilter::Active),
            "I" => Ok(StateFilter::Inactive),
            "D" => Ok(StateFilter::Deleted),
            other => Err(VantageError::InvalidArgument(format!(
                "state filter must be one of A, I, D or absent, got '{}'",
                other
            ))),
        }
    }
}

/// A paged "changed since" query over one view angle and collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub since: Timestamp,
    pub view_angle: String,
    pub collection: String,
    pub filter: StateFilter,
    pub offset: usize,
    pub limit: usize,
}

impl LookupQuery {
    pub fn new(
        since: Timestamp,
        view_angle: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            since,
            view_angle: view_angle.into(),
            collection: collection.into(),
            filter: StateFilter::Any,
            offset: 0,
            limit: 100,
        }
    }

    pub fn with_filter(mut self, filter: StateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// One row of a lookup result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedRecord {
    pub entry_pid: String,
    pub view_angle: String,
    pub collection: String,
    pub last_changed: Timestamp,
    pub state: State,
}
