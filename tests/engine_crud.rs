//! End-to-end CRUD behavior over a plain-text root directory.

use gbdb::{Gbdb, GbdbConfig, Row};
use serde_json::json;
use tempfile::tempdir;

fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    let mut row = Row::new();
    for (k, v) in pairs {
        row.insert((*k).into(), v.clone());
    }
    row
}

fn engine(root: &std::path::Path) -> Gbdb {
    Gbdb::open(GbdbConfig::plain(root)).expect("open")
}

#[test]
fn ids_start_at_zero_and_never_come_back() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    db.create_database("main").expect("db");
    db.create_table("main", "users", &["name"]).expect("table");

    let first = db.insert_data("main", "users", row(&[("name", json!("Ann"))])).expect("ins");
    assert_eq!(first, 0);

    assert!(db.delete_data("main", "users", "id", &json!(0)).expect("del"));
    let second = db.insert_data("main", "users", row(&[("name", json!("Bob"))])).expect("ins");
    assert_eq!(second, 1);

    // Still 2 after compaction drops the tombstones.
    db.compact_table("main", "users").expect("compact");
    assert_eq!(db.next_id("main", "users").expect("next"), 2);
}

#[test]
fn explicit_ids_advance_the_auto_counter() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    db.create_database("main").expect("db");
    db.create_table("main", "users", &["name"]).expect("table");

    let mut explicit = row(&[("name", json!("Eve"))]);
    explicit.insert("id".into(), json!(5));
    assert_eq!(db.insert_data("main", "users", explicit).expect("ins"), 5);
    assert_eq!(
        db.insert_data("main", "users", row(&[("name", json!("Fay"))])).expect("ins"),
        6
    );
}

#[test]
fn edits_patch_in_place_and_report_misses() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    db.create_database("main").expect("db");
    db.create_table("main", "users", &["name", "email"]).expect("table");
    db.insert_data("main", "users", row(&[("name", json!("Ann")), ("email", json!("old@x.io"))]))
        .expect("ins");

    assert!(db
        .edit_data("main", "users", "name", &json!("Ann"), row(&[("email", json!("new@x.io"))]))
        .expect("edit"));
    let found = db
        .find_row("main", "users", "email", &json!("new@x.io"))
        .expect("find")
        .expect("row");
    assert_eq!(found["name"], json!("Ann"));

    assert!(!db
        .edit_data("main", "users", "name", &json!("Zed"), row(&[("email", json!("x"))]))
        .expect("no match"));
    assert!(!db.delete_data("main", "users", "name", &json!("Zed")).expect("no match"));
}

#[test]
fn where_filters_match_loosely() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    db.create_database("main").expect("db");
    db.create_table("main", "orders", &["qty", "paid"]).expect("table");
    db.insert_data("main", "orders", row(&[("qty", json!(3)), ("paid", json!(true))])).expect("ins");

    assert!(db.element_exists("main", "orders", "qty", &json!("3")).expect("exists"));
    assert!(db.element_exists("main", "orders", "qty", &json!(3.0)).expect("exists"));
    assert!(db.element_exists("main", "orders", "paid", &json!("true")).expect("exists"));
    assert!(!db.element_exists("main", "orders", "qty", &json!("03")).expect("exists"));
}

#[test]
fn compaction_folds_the_log_and_preserves_content() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    db.create_database("main").expect("db");
    db.create_table("main", "users", &["name"]).expect("table");

    for i in 0..100 {
        db.insert_data("main", "users", row(&[("name", json!(format!("user-{i}")))]))
            .expect("ins");
    }
    for i in 0..50 {
        assert!(db.delete_data("main", "users", "id", &json!(i * 2)).expect("del"));
    }

    let before = db.get_data("main", "users").expect("get");
    assert_eq!(before.len(), 50);
    assert!(db.compact_table("main", "users").expect("compact"));
    let after = db.get_data("main", "users").expect("get");
    assert_eq!(before, after);

    let log = dir.path().join("main").join("__append__users.json");
    assert_eq!(std::fs::metadata(&log).expect("log").len(), 0);

    let stats = db.table_stats("main", "users").expect("stats").expect("present");
    assert_eq!(stats.rows, 50);
    assert_eq!(stats.append_ops, 0);
    assert_eq!(stats.last_id, 99);
}

#[test]
fn state_survives_reopening_the_root() {
    let dir = tempdir().expect("temp");
    {
        let db = engine(dir.path());
        db.create_database("main").expect("db");
        db.create_table("main", "users", &["name"]).expect("table");
        db.insert_data("main", "users", row(&[("name", json!("Ann"))])).expect("ins");
    }

    let db = engine(dir.path());
    assert_eq!(db.list_dbs().expect("dbs"), vec!["main"]);
    assert_eq!(db.list_tables("main", false).expect("tables"), vec!["users"]);
    let data = db.get_data("main", "users").expect("get");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], json!("Ann"));
    assert_eq!(db.get_keys("main", "users").expect("keys"), vec!["id", "name"]);
    assert_eq!(db.next_id("main", "users").expect("next"), 1);
}

#[test]
fn compact_all_walks_every_table() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    db.create_database("main").expect("db");
    for table in ["a", "b", "c"] {
        db.create_table("main", table, &["v"]).expect("table");
        db.insert_data("main", table, row(&[("v", json!(1))])).expect("ins");
    }

    assert_eq!(db.compact_all("main").expect("compact"), 3);
    for table in ["a", "b", "c"] {
        let stats = db.table_stats("main", table).expect("stats").expect("present");
        assert_eq!(stats.append_ops, 0);
        assert_eq!(stats.rows, 1);
    }
}

#[test]
fn database_names_are_sanitized_before_path_use() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    assert!(db.create_database("ma-in/..").expect("create"));
    // The traversal characters are stripped, leaving a plain directory.
    assert!(dir.path().join("main").is_dir());
    assert_eq!(db.list_dbs().expect("dbs"), vec!["main"]);
    assert!(!db.create_database("main").expect("same name"));
}

#[test]
fn delete_all_removes_tables_then_database() {
    let dir = tempdir().expect("temp");
    let db = engine(dir.path());
    db.create_database("main").expect("db");
    db.create_table("main", "a", &["x"]).expect("table");
    db.create_table("main", "b", &["x"]).expect("table");
    db.insert_data("main", "a", row(&[("x", json!(1))])).expect("ins");

    assert!(db.delete_all("main").expect("delete all"));
    assert!(db.list_dbs().expect("dbs").is_empty());
    assert!(!dir.path().join("main").exists());
}
