//! The merge that turns `base snapshot + append log` into the logical row
//! set. Both reads and compaction go through [`apply_ops`], so a compacted
//! table is observably identical to the un-compacted view.

use crate::table::ops::AppendOp;
use crate::table::row::{Row, TableHeader, row_id};
use std::collections::HashMap;

/// Applies append-log operations, in log order, to the base rows (header
/// excluded). Later ops win over earlier ones for the same id:
///
/// * `ins` overwrites an existing id in place, otherwise appends;
/// * `upd` patches only columns present in the header of an existing id
///   (`id` itself and unknown columns are ignored), missing ids are ignored;
/// * `del` removes the row; positions shift, so the id map is rebuilt.
pub fn apply_ops(mut rows: Vec<Row>, ops: &[AppendOp], header: &TableHeader) -> Vec<Row> {
    let mut by_id = index_by_id(&rows);

    for op in ops {
        match op {
            AppendOp::Insert { row, .. } => {
                let Some(id) = row_id(row) else { continue };
                match by_id.get(&id) {
                    Some(&at) => rows[at] = row.clone(),
                    None => {
                        by_id.insert(id, rows.len());
                        rows.push(row.clone());
                    }
                }
            }
            AppendOp::Update { id, set, .. } => {
                let Some(&at) = by_id.get(id) else { continue };
                for (column, value) in set {
                    if column != "id" && header.contains(column) {
                        rows[at].insert(column.clone(), value.clone());
                    }
                }
            }
            AppendOp::Delete { id, .. } => {
                let Some(at) = by_id.remove(id) else { continue };
                rows.remove(at);
                by_id = index_by_id(&rows);
            }
        }
    }

    rows
}

fn index_by_id(rows: &[Row]) -> HashMap<i64, usize> {
    rows.iter()
        .enumerate()
        .filter_map(|(at, row)| row_id(row).map(|id| (id, at)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::apply_ops;
    use crate::table::ops::AppendOp;
    use crate::table::row::{Row, TableHeader};
    use proptest::prelude::*;
    use serde_json::json;

    fn header() -> TableHeader {
        TableHeader::from_columns(&["name", "email"])
    }

    fn row(id: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), json!(id));
        row.insert("name".into(), json!(name));
        row.insert("email".into(), json!(format!("{name}@x.io")));
        row
    }

    fn patch(pairs: &[(&str, serde_json::Value)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert((*k).into(), v.clone());
        }
        row
    }

    #[test]
    fn inserts_append_in_log_order() {
        let merged = apply_ops(
            vec![row(0, "ann")],
            &[AppendOp::insert(row(1, "bob")), AppendOp::insert(row(2, "cat"))],
            &header(),
        );
        let ids: Vec<_> = merged.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn insert_with_existing_id_overwrites_in_place() {
        let merged = apply_ops(
            vec![row(0, "ann"), row(1, "bob")],
            &[AppendOp::insert(row(0, "anna"))],
            &header(),
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["name"], json!("anna"));
        assert_eq!(merged[1]["name"], json!("bob"));
    }

    #[test]
    fn update_ignores_unknown_columns_and_missing_ids() {
        let merged = apply_ops(
            vec![row(0, "ann")],
            &[
                AppendOp::update(0, patch(&[("email", json!("new@x.io")), ("foo", json!("x"))])),
                AppendOp::update(99, patch(&[("name", json!("ghost"))])),
            ],
            &header(),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["email"], json!("new@x.io"));
        assert!(merged[0].get("foo").is_none());
    }

    #[test]
    fn update_cannot_change_ids() {
        let merged = apply_ops(
            vec![row(0, "ann")],
            &[AppendOp::update(0, patch(&[("id", json!(9))]))],
            &header(),
        );
        assert_eq!(merged[0]["id"], json!(0));
    }

    #[test]
    fn delete_shifts_positions_for_later_ops() {
        let merged = apply_ops(
            vec![row(0, "ann"), row(1, "bob"), row(2, "cat")],
            &[
                AppendOp::delete(0),
                // Positions shifted; this must still hit id 2.
                AppendOp::update(2, patch(&[("name", json!("carl"))])),
                AppendOp::delete(7),
            ],
            &header(),
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["id"], json!(1));
        assert_eq!(merged[1]["name"], json!("carl"));
    }

    #[test]
    fn later_ops_win_for_the_same_id() {
        let merged = apply_ops(
            vec![],
            &[
                AppendOp::insert(row(0, "ann")),
                AppendOp::delete(0),
                AppendOp::insert(row(0, "anna")),
                AppendOp::update(0, patch(&[("email", json!("final@x.io"))])),
            ],
            &header(),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["name"], json!("anna"));
        assert_eq!(merged[0]["email"], json!("final@x.io"));
    }

    proptest! {
        /// Folding a prefix of the log into the base (what compaction does)
        /// then applying the rest is the same as applying the whole log.
        #[test]
        fn merge_is_foldable(split in 0usize..=6) {
            let ops = vec![
                AppendOp::insert(row(1, "a")),
                AppendOp::insert(row(2, "b")),
                AppendOp::update(1, patch(&[("name", json!("a2"))])),
                AppendOp::delete(2),
                AppendOp::insert(row(3, "c")),
                AppendOp::delete(1),
            ];
            let base = vec![row(0, "seed")];
            let all_at_once = apply_ops(base.clone(), &ops, &header());
            let folded = apply_ops(base, &ops[..split], &header());
            let resumed = apply_ops(folded, &ops[split..], &header());
            prop_assert_eq!(all_at_once, resumed);
        }
    }
}
