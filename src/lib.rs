//! GBDB is a self-contained flat-file database engine. Databases are
//! directories, tables are JSON files, and every mutation is appended to
//! a per-table operation log that explicit compaction folds back into the
//! base snapshot. With a secret configured, table names are replaced by
//! deterministic HMAC tokens and file contents are encrypted with
//! AES-256-GCM.
//!
//! ```no_run
//! use gbdb::{Gbdb, GbdbConfig, Row};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), gbdb::GbdbError> {
//! let db = Gbdb::open(GbdbConfig::plain("./data"))?;
//! db.create_database("main")?;
//! db.create_table("main", "users", &["name", "email"])?;
//!
//! let mut row = Row::new();
//! row.insert("name".into(), json!("Ann"));
//! let id = db.insert_data("main", "users", row)?;
//! assert_eq!(id, 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypt;
pub mod error;
pub mod fsio;
pub mod names;
pub mod table;

pub use config::GbdbConfig;
pub use error::{GbdbError, GbdbErrorCode, ResourceType};
pub use table::row::Row;
pub use table::store::TableStats;

use crate::crypt::Codec;
use crate::names::NameService;
use crate::table::lock::LockRegistry;
use crate::table::store::TableStore;
use serde_json::Value;
use tracing::info;

/// One engine instance over one root directory. Cheap to share behind an
/// `Arc`; all per-table mutual exclusion lives in the instance's lock
/// registry plus advisory file locks, so two instances (or processes)
/// over the same root stay consistent.
pub struct Gbdb {
    config: GbdbConfig,
    codec: Codec,
    names: NameService,
    locks: LockRegistry,
}

impl Gbdb {
    /// Opens an instance over `config.root`, creating the root directory
    /// if needed. Fails when encryption is requested without a secret.
    pub fn open(config: GbdbConfig) -> Result<Self, GbdbError> {
        let codec = Codec::new(&config)?;
        let names = NameService::new(&config)?;
        std::fs::create_dir_all(&config.root)?;
        info!(
            root = %config.root.display(),
            encrypted = config.encrypt,
            "gbdb instance opened"
        );
        Ok(Self {
            config,
            codec,
            names,
            locks: LockRegistry::new(),
        })
    }

    pub fn config(&self) -> &GbdbConfig {
        &self.config
    }

    fn store(&self) -> TableStore<'_> {
        TableStore {
            config: &self.config,
            codec: &self.codec,
            names: &self.names,
            locks: &self.locks,
        }
    }

    /// Creates a database; `Ok(false)` when it already exists.
    pub fn create_database(&self, db: &str) -> Result<bool, GbdbError> {
        self.store().create_database(db)
    }

    /// Deletes a database that holds no tables; `Ok(false)` when it is
    /// absent or not empty.
    pub fn delete_database(&self, db: &str) -> Result<bool, GbdbError> {
        self.store().delete_database(db)
    }

    /// Deletes every table of a database and then the database itself.
    pub fn delete_all(&self, db: &str) -> Result<bool, GbdbError> {
        self.store().delete_all(db)
    }

    /// Creates a table with the given columns; `Ok(false)` when it
    /// already exists.
    pub fn create_table(&self, db: &str, table: &str, columns: &[&str]) -> Result<bool, GbdbError> {
        self.store().create_table(db, table, columns)
    }

    /// Deletes a table and all of its files; `Ok(false)` when absent.
    pub fn delete_table(&self, db: &str, table: &str) -> Result<bool, GbdbError> {
        self.store().delete_table(db, table)
    }

    /// Inserts a row and returns its id. Omitting `id` assigns the next
    /// auto id; supplying one overwrites any existing row with that id.
    pub fn insert_data(&self, db: &str, table: &str, row: Row) -> Result<i64, GbdbError> {
        self.store().insert_data(db, table, row)
    }

    /// Deletes every row whose `where_col` loosely equals `value`;
    /// `Ok(false)` when nothing matched.
    pub fn delete_data(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
    ) -> Result<bool, GbdbError> {
        self.store().delete_data(db, table, where_col, value)
    }

    /// Patches every row whose `where_col` loosely equals `value`;
    /// `Ok(false)` when nothing matched.
    pub fn edit_data(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
        patch: Row,
    ) -> Result<bool, GbdbError> {
        self.store().edit_data(db, table, where_col, value, patch)
    }

    /// All rows of a table, log applied, header excluded. An absent table
    /// reads as empty.
    pub fn get_data(&self, db: &str, table: &str) -> Result<Vec<Row>, GbdbError> {
        self.store().get_data(db, table)
    }

    /// First row whose `where_col` loosely equals `value`.
    pub fn find_row(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
    ) -> Result<Option<Row>, GbdbError> {
        self.store().find_row(db, table, where_col, value)
    }

    pub fn element_exists(
        &self,
        db: &str,
        table: &str,
        where_col: &str,
        value: &Value,
    ) -> Result<bool, GbdbError> {
        self.store().element_exists(db, table, where_col, value)
    }

    pub fn list_dbs(&self) -> Result<Vec<String>, GbdbError> {
        self.store().list_dbs()
    }

    pub fn list_tables(&self, db: &str, descending: bool) -> Result<Vec<String>, GbdbError> {
        self.store().list_tables(db, descending)
    }

    /// Folds a table's append log into its base snapshot.
    pub fn compact_table(&self, db: &str, table: &str) -> Result<bool, GbdbError> {
        self.store().compact_table(db, table)
    }

    /// Compacts every table of a database; returns how many were
    /// compacted.
    pub fn compact_all(&self, db: &str) -> Result<usize, GbdbError> {
        let store = self.store();
        let tables = store.list_tables(db, false)?;
        for table in &tables {
            store.compact_table(db, table)?;
        }
        info!(db = %db, tables = tables.len(), "database compacted");
        Ok(tables.len())
    }

    /// The id the next auto insert would receive; 0 for an absent table.
    pub fn next_id(&self, db: &str, table: &str) -> Result<i64, GbdbError> {
        self.store().next_id(db, table)
    }

    /// Column names in header order, `id` first; empty when absent.
    pub fn get_keys(&self, db: &str, table: &str) -> Result<Vec<String>, GbdbError> {
        self.store().get_keys(db, table)
    }

    /// Live counters for a table; `None` when it does not exist.
    pub fn table_stats(&self, db: &str, table: &str) -> Result<Option<TableStats>, GbdbError> {
        self.store().table_stats(db, table)
    }
}
