use crate::table::ops::now_seconds;
use serde::{Deserialize, Serialize};

/// Per-table counters, stored as a single-row table
/// `[{"last_id":..,"rows":..,"append_ops":..,"indexes":[],"created_at":..,"updated_at":..}]`.
///
/// `last_id` is the authoritative source for the next auto-generated id
/// and must never regress; `rows`/`append_ops` are statistics that may
/// drift from the log on partial failure (reads derive truth from the
/// merge, not from here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub last_id: i64,
    pub rows: u64,
    pub append_ops: u64,
    #[serde(default)]
    pub indexes: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TableMeta {
    /// Fresh meta for a newly created table. `last_id` starts below zero
    /// so the first generated id is 0.
    pub fn fresh() -> Self {
        let now = now_seconds();
        Self {
            last_id: -1,
            rows: 0,
            append_ops: 0,
            indexes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn next_id(&self) -> i64 {
        self.last_id + 1
    }

    /// Registers an id that was just inserted; the high-water mark only
    /// moves forward.
    pub fn observe_id(&mut self, id: i64) {
        self.last_id = self.last_id.max(id);
    }

    pub fn touch(&mut self) {
        self.updated_at = now_seconds();
    }
}
