use crate::table::row::Row;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One append-log entry. Serialized as a single JSON line:
/// `{"op":"ins","row":{...},"ts":...}`, `{"op":"upd","id":N,"set":{...},"ts":...}`
/// or `{"op":"del","id":N,"ts":...}`. In encrypted mode each line is
/// passed through the cipher individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum AppendOp {
    #[serde(rename = "ins")]
    Insert { row: Row, ts: i64 },
    #[serde(rename = "upd")]
    Update { id: i64, set: Row, ts: i64 },
    #[serde(rename = "del")]
    Delete { id: i64, ts: i64 },
}

impl AppendOp {
    pub fn insert(row: Row) -> Self {
        AppendOp::Insert {
            row,
            ts: now_seconds(),
        }
    }

    pub fn update(id: i64, set: Row) -> Self {
        AppendOp::Update {
            id,
            set,
            ts: now_seconds(),
        }
    }

    pub fn delete(id: i64) -> Self {
        AppendOp::Delete {
            id,
            ts: now_seconds(),
        }
    }
}

pub fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
