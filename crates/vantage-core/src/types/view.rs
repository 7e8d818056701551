use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Materialized membership of one entry under one view angle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewBundle {
    pub entry_pid: String,
    pub view_angle: String,
    /// Member pids in the order the repository reported them.
    pub members: Vec<String>,
}

impl ViewBundle {
    pub fn new(
        entry_pid: impl Into<String>,
        view_angle: impl Into<String>,
        members: Vec<String>,
    ) -> Self {
        Self {
            entry_pid: entry_pid.into(),
            view_angle: view_angle.into(),
            members,
        }
    }

    /// Members as a set, always including the entry itself.
    pub fn member_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.members.iter().cloned().collect();
        set.insert(self.entry_pid.clone());
        set
    }
}
