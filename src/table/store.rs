//! The storage engine: every database/table operation bottoms out here.
//!
//! A table is three files in its database directory: a base snapshot
//! (header row plus data rows), an append log of JSON-line operations and
//! a single-row meta table with counters. Reads merge the log over the
//! snapshot; mutations append to the log under the table lock; compaction
//! folds the log back into the snapshot.

use crate::config::GbdbConfig;
use crate::crypt::Codec;
use crate::error::{GbdbError, ResourceType};
use crate::fsio;
use crate::names::{NameService, TablePaths, clean_name};
use crate::table::compact::apply_ops;
use crate::table::lock::LockRegistry;
use crate::table::meta::TableMeta;
use crate::table::ops::AppendOp;
use crate::table::row::{Row, TableHeader, is_header, loose_eq, row_id};
use serde_json::Value;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

/// Point-in-time counters for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    /// Live rows after merging the append log (header excluded).
    pub rows: u64,
    /// Operations waiting in the append log since the last compaction.
    pub append_ops: u64,
    pub last_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Borrowed view over one instance's shared components; all operations
/// take logical (unsanitized) database and table names.
pub struct TableStore<'a> {
    pub(crate) config: &'a GbdbConfig,
    pub(crate) codec: &'a Codec,
    pub(crate) names: &'a NameService,
    pub(crate) locks: &'a LockRegistry,
}

impl TableStore<'_> {
    // ---- database lifecycle -------------------------------------------

    /// Creates a database directory; false when it already exists.
    pub fn create_database(&self, db: &str) -> Result<bool, GbdbError> {
        let cleaned = clean_name(db);
        if cleaned.is_empty() {
            return Err(GbdbError::Malformed("empty database name".into()));
        }
        if self.locate_db(db)?.is_some() {
            return Ok(false);
        }
        let dirname = self
            .names
            .resolve_db(self.codec, db, true)?
            .ok_or_else(|| GbdbError::Malformed("empty database name".into()))?;
        std::fs::create_dir_all(self.names.root().join(&dirname))?;
        debug!(db = %cleaned, "database created");
        Ok(true)
    }

    /// Deletes an empty database. A directory holding anything besides the
    /// table-name index is left alone and false is returned.
    pub fn delete_database(&self, db: &str) -> Result<bool, GbdbError> {
        let Some(dirname) = self.locate_db(db)? else {
            return Ok(false);
        };
        let dir = self.names.root().join(&dirname);
        let index_filename = self.names.table_index_filename();
        for entry in std::fs::read_dir(&dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if Some(&name) != index_filename.as_ref() {
                return Ok(false);
            }
        }
        if let Some(filename) = index_filename {
            remove_if_exists(&dir.join(filename))?;
        }
        std::fs::remove_dir(&dir)?;
        if let Some(index) = self.names.db_index() {
            index.drop_name(self.codec, &clean_name(db))?;
        }
        debug!(db = %clean_name(db), "database deleted");
        Ok(true)
    }

    /// Deletes every table of a database, then the database itself.
    pub fn delete_all(&self, db: &str) -> Result<bool, GbdbError> {
        if self.locate_db(db)?.is_none() {
            return Ok(false);
        }
        for table in self.list_tables(db, false)? {
            self.delete_table(db, &table)?;
        }
        self.delete_database(db)
    }

    pub fn list_dbs(&self) -> Result<Vec<String>, GbdbError> {
        let mut dbs: Vec<String> = self
            .names
            .list_db_entries(self.codec)?
            .into_iter()
            .map(|(plain, _)| plain)
            .collect();
        // Index-backed listings come in insertion order; present both
        // modes the same way.
        dbs.sort();
        Ok(dbs)
    }

    // ---- table lifecycle ----------------------------------------------

    /// Creates a table with the given columns; false when it already
    /// exists. Writes a header-only snapshot, an empty append log and
    /// fresh counters.
    pub fn create_table(&self, db: &str, table: &str, columns: &[&str]) -> Result<bool, GbdbError> {
        let Some(dirname) = self.locate_db(db)? else {
            return Err(self.db_not_found(db));
        };
        if clean_name(table).is_empty() {
            return Err(GbdbError::Malformed("empty table name".into()));
        }
        if self.locate_table(db, table)?.is_some() {
            return Ok(false);
        }

        let db_dir = self.names.root().join(&dirname);
        let stem = self
            .names
            .resolve_table(self.codec, db, &db_dir, table, true)?
            .ok_or_else(|| GbdbError::Malformed("empty table name".into()))?;
        let paths = self.names.table_paths(&dirname, &stem);

        let header = TableHeader::from_columns(columns);
        self.write_base(&paths, &header, &[])?;
        touch_log(&paths.append)?;
        self.save_meta(&paths, &TableMeta::fresh())?;
        debug!(db = %clean_name(db), table = %clean_name(table), "table created");
        Ok(true)
    }

    /// Removes a table and all of its files; false when it does not exist.
    pub fn delete_table(&self, db: &str, table: &str) -> Result<bool, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Ok(false);
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                remove_if_exists(&paths.base)?;
                remove_if_exists(&paths.append)?;
                remove_if_exists(&paths.meta)?;
                Ok(())
            })?;
        remove_if_exists(&paths.lock)?;
        if let Some(index) = self.names.table_index(&paths.db_dir) {
            index.drop_name(self.codec, &clean_name(table))?;
        }
        debug!(db = %clean_name(db), table = %clean_name(table), "table deleted");
        Ok(true)
    }

    pub fn list_tables(&self, db: &str, descending: bool) -> Result<Vec<String>, GbdbError> {
        let Some(dirname) = self.locate_db(db)? else {
            return Ok(Vec::new());
        };
        let mut tables: Vec<String> = self
            .names
            .list_table_entries(self.codec, &dirname)?
            .into_iter()
            .map(|(plain, _)| plain)
            .collect();
        tables.sort();
        if descending {
            tables.reverse();
        }
        Ok(tables)
    }

    // ---- row operations -----------------------------------------------

    /// Inserts a row and returns its id. Without an `id` column the next
    /// auto id is assigned; an explicit id overwrites any existing row
    /// with that id. Unknown columns are rejected, missing ones take the
    /// header default.
    pub fn insert_data(&self, db: &str, table: &str, data: Row) -> Result<i64, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Err(self.not_found(db, table)?);
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                let (mut header, base_rows) = self.load_base(&paths)?;
                // A table created without columns adopts the shape of its
                // first row.
                if header.columns.is_empty() && data.keys().any(|k| k != "id") {
                    header = TableHeader::from_row_keys(&data);
                    self.write_base(&paths, &header, &base_rows)?;
                }

                let ops = self.load_ops(&paths)?;
                let merged = apply_ops(base_rows, &ops, &header);
                let mut meta = self.load_meta_or_rebuild(&paths, &merged)?;

                let id = match data.get("id") {
                    None => meta.next_id(),
                    Some(Value::Number(n)) if n.as_i64().is_some() => {
                        n.as_i64().ok_or_else(|| {
                            GbdbError::Malformed("row id out of range".into())
                        })?
                    }
                    Some(_) => {
                        return Err(GbdbError::Malformed("row id must be an integer".into()));
                    }
                };
                let row = header.build_row(id, &data)?;
                let replaced = merged.iter().any(|r| row_id(r) == Some(id));

                let line = self.codec.encode_line(&AppendOp::insert(row))?;
                fsio::append_line(&paths.append, &line)?;

                meta.observe_id(id);
                if !replaced {
                    meta.rows += 1;
                }
                meta.append_ops += 1;
                meta.touch();
                self.save_meta(&paths, &meta)?;
                Ok(id)
            })
    }

    /// Deletes every row whose `where_col` loosely equals `value`; false
    /// when nothing matched.
    pub fn delete_data(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
    ) -> Result<bool, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Err(self.not_found(db, table)?);
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                let (_, merged) = self.materialize(&paths)?;
                let ids = matching_ids(&merged, where_col, value);
                if ids.is_empty() {
                    return Ok(false);
                }
                for id in &ids {
                    let line = self.codec.encode_line(&AppendOp::delete(*id))?;
                    fsio::append_line(&paths.append, &line)?;
                }
                let mut meta = self.load_meta_or_rebuild(&paths, &merged)?;
                meta.rows = meta.rows.saturating_sub(ids.len() as u64);
                meta.append_ops += ids.len() as u64;
                meta.touch();
                self.save_meta(&paths, &meta)?;
                Ok(true)
            })
    }

    /// Patches every row whose `where_col` loosely equals `value`. Patch
    /// columns outside the header are dropped silently; a patch with no
    /// applicable column left is malformed. False when nothing matched.
    pub fn edit_data(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
        patch: Row,
    ) -> Result<bool, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Err(self.not_found(db, table)?);
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                let (header, merged) = self.materialize(&paths)?;
                let set: Row = patch
                    .iter()
                    .filter(|(k, _)| *k != "id" && header.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if set.is_empty() {
                    return Err(GbdbError::Malformed(
                        "patch contains no known columns".into(),
                    ));
                }
                let ids = matching_ids(&merged, where_col, value);
                if ids.is_empty() {
                    return Ok(false);
                }
                for id in &ids {
                    let line = self.codec.encode_line(&AppendOp::update(*id, set.clone()))?;
                    fsio::append_line(&paths.append, &line)?;
                }
                let mut meta = self.load_meta_or_rebuild(&paths, &merged)?;
                meta.append_ops += ids.len() as u64;
                meta.touch();
                self.save_meta(&paths, &meta)?;
                Ok(true)
            })
    }

    /// All data rows in stored order; empty when the table is absent.
    /// Reads hold the table lock like mutations do, so a racing compaction
    /// can never show the old snapshot with a truncated log.
    pub fn get_data(&self, db: &str, table: &str) -> Result<Vec<Row>, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Ok(Vec::new());
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                Ok(self.materialize(&paths)?.1)
            })
    }

    /// First row whose `where_col` loosely equals `value`.
    pub fn find_row(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
    ) -> Result<Option<Row>, GbdbError> {
        Ok(self
            .get_data(db, table)?
            .into_iter()
            .find(|row| row.get(where_col).is_some_and(|v| loose_eq(v, value))))
    }

    pub fn element_exists(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
    ) -> Result<bool, GbdbError> {
        Ok(self.find_row(db, table, where_col, value)?.is_some())
    }

    /// The id the next auto insert would get; 0 for an absent table.
    pub fn next_id(&self, db: &str, table: &str) -> Result<i64, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Ok(0);
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                let (_, merged) = self.materialize(&paths)?;
                Ok(self.load_meta_or_rebuild(&paths, &merged)?.next_id())
            })
    }

    /// Column names in header order, `id` first; empty when absent.
    pub fn get_keys(&self, db: &str, table: &str) -> Result<Vec<String>, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Ok(Vec::new());
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                let (header, _) = self.load_base(&paths)?;
                Ok(header.keys())
            })
    }

    // ---- compaction and stats -----------------------------------------

    /// Folds the append log into the base snapshot: rewrites the snapshot
    /// atomically, truncates the log, resets the counters. Reads before
    /// and after observe identical rows. True always; an empty log is a
    /// no-op.
    pub fn compact_table(&self, db: &str, table: &str) -> Result<bool, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Err(self.not_found(db, table)?);
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                let ops = self.load_ops(&paths)?;
                if ops.is_empty() {
                    return Ok(true);
                }
                let (header, base_rows) = self.load_base(&paths)?;
                let merged = apply_ops(base_rows, &ops, &header);

                self.write_base(&paths, &header, &merged)?;
                truncate_log(&paths.append)?;

                let mut meta = self.load_meta_or_rebuild(&paths, &merged)?;
                meta.rows = merged.len() as u64;
                for row in &merged {
                    if let Some(id) = row_id(row) {
                        meta.observe_id(id);
                    }
                }
                meta.append_ops = 0;
                meta.touch();
                self.save_meta(&paths, &meta)?;
                debug!(
                    db = %clean_name(db),
                    table = %clean_name(table),
                    rows = merged.len(),
                    ops = ops.len(),
                    "table compacted"
                );
                Ok(true)
            })
    }

    pub fn table_stats(&self, db: &str, table: &str) -> Result<Option<TableStats>, GbdbError> {
        let Some(paths) = self.locate_table(db, table)? else {
            return Ok(None);
        };
        self.locks
            .with_lock(&paths.lock, self.config.lock_timeout, || {
                let (_, merged) = self.materialize(&paths)?;
                let ops = self.load_ops(&paths)?;
                let meta = self.load_meta_or_rebuild(&paths, &merged)?;
                Ok(Some(TableStats {
                    rows: merged.len() as u64,
                    append_ops: ops.len() as u64,
                    last_id: meta.last_id,
                    created_at: meta.created_at,
                    updated_at: meta.updated_at,
                }))
            })
    }

    // ---- location and file plumbing -----------------------------------

    /// On-disk directory name of an existing database; `None` when absent.
    fn locate_db(&self, db: &str) -> Result<Option<String>, GbdbError> {
        let Some(dirname) = self.names.resolve_db(self.codec, db, false)? else {
            return Ok(None);
        };
        if self.names.root().join(&dirname).is_dir() {
            Ok(Some(dirname))
        } else {
            Ok(None)
        }
    }

    /// Paths of an existing table; `None` when database or table is absent.
    fn locate_table(&self, db: &str, table: &str) -> Result<Option<TablePaths>, GbdbError> {
        let Some(dirname) = self.locate_db(db)? else {
            return Ok(None);
        };
        let db_dir = self.names.root().join(&dirname);
        let Some(stem) = self
            .names
            .resolve_table(self.codec, db, &db_dir, table, false)?
        else {
            return Ok(None);
        };
        let paths = self.names.table_paths(&dirname, &stem);
        if paths.base.is_file() {
            Ok(Some(paths))
        } else {
            Ok(None)
        }
    }

    fn db_not_found(&self, db: &str) -> GbdbError {
        GbdbError::NotFound {
            resource_type: ResourceType::Database,
            resource_id: clean_name(db),
        }
    }

    /// A mutation aimed at something absent: missing database wins over
    /// missing table in the report.
    fn not_found(&self, db: &str, table: &str) -> Result<GbdbError, GbdbError> {
        if self.locate_db(db)?.is_none() {
            return Ok(self.db_not_found(db));
        }
        Ok(GbdbError::table_not_found(&clean_name(db), &clean_name(table)))
    }

    /// Base snapshot split into header and data rows.
    fn load_base(&self, paths: &TablePaths) -> Result<(TableHeader, Vec<Row>), GbdbError> {
        let Some(bytes) = fsio::read_file(&paths.base)? else {
            return Ok((TableHeader::from_columns::<&str>(&[]), Vec::new()));
        };
        let rows: Vec<Row> = self.codec.decode_doc(&bytes)?;
        let mut header = TableHeader::from_columns::<&str>(&[]);
        let mut data = Vec::with_capacity(rows.len().saturating_sub(1));
        for row in rows {
            match TableHeader::parse(&row) {
                Some(parsed) => header = parsed,
                None => data.push(row),
            }
        }
        Ok((header, data))
    }

    fn write_base(
        &self,
        paths: &TablePaths,
        header: &TableHeader,
        data: &[Row],
    ) -> Result<(), GbdbError> {
        let mut doc = Vec::with_capacity(data.len() + 1);
        doc.push(header.to_row());
        doc.extend(data.iter().cloned());
        let bytes = self.codec.encode_doc(&doc)?;
        fsio::write_atomic(&paths.base, &bytes)
    }

    fn load_ops(&self, paths: &TablePaths) -> Result<Vec<AppendOp>, GbdbError> {
        let Some(bytes) = fsio::read_file(&paths.append)? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8(bytes).map_err(|_| GbdbError::Tampered {
            message: "append log is not valid UTF-8".into(),
        })?;
        let mut ops = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            ops.push(self.codec.decode_line(line)?);
        }
        Ok(ops)
    }

    /// Header plus data rows with the append log applied.
    fn materialize(&self, paths: &TablePaths) -> Result<(TableHeader, Vec<Row>), GbdbError> {
        let (header, base_rows) = self.load_base(paths)?;
        let ops = self.load_ops(paths)?;
        let merged = apply_ops(base_rows, &ops, &header);
        Ok((header, merged))
    }

    /// Counters for the table; a missing meta file (older tree, partial
    /// failure) is rebuilt from the merged content.
    fn load_meta_or_rebuild(
        &self,
        paths: &TablePaths,
        merged: &[Row],
    ) -> Result<TableMeta, GbdbError> {
        if let Some(bytes) = fsio::read_file(&paths.meta)? {
            let doc: Vec<TableMeta> = self.codec.decode_doc(&bytes)?;
            if let Some(meta) = doc.into_iter().next() {
                return Ok(meta);
            }
        }
        let mut meta = TableMeta::fresh();
        meta.rows = merged.len() as u64;
        for row in merged {
            if let Some(id) = row_id(row) {
                meta.observe_id(id);
            }
        }
        Ok(meta)
    }

    fn save_meta(&self, paths: &TablePaths, meta: &TableMeta) -> Result<(), GbdbError> {
        let bytes = self.codec.encode_doc(&vec![meta.clone()])?;
        fsio::write_atomic(&paths.meta, &bytes)
    }
}

fn matching_ids(rows: &[Row], where_col: &str, value: &Value) -> Vec<i64> {
    rows.iter()
        .filter(|row| !is_header(row))
        .filter(|row| row.get(where_col).is_some_and(|v| loose_eq(v, value)))
        .filter_map(row_id)
        .collect()
}

fn remove_if_exists(path: &Path) -> Result<(), GbdbError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GbdbError::Io(e)),
    }
}

/// Creates the append log if it is missing, leaving content untouched.
fn touch_log(path: &Path) -> Result<(), GbdbError> {
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// Empties the append log in place. The log is truncated rather than
/// renamed so concurrent appenders holding the table lock never race a
/// vanishing inode.
fn truncate_log(path: &Path) -> Result<(), GbdbError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.sync_all()?;
    Ok(())
}
