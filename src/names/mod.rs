pub mod index;
pub mod token;

use crate::config::GbdbConfig;
use crate::crypt::Codec;
use crate::error::GbdbError;
use index::NameIndex;
use std::path::{Path, PathBuf};
use token::NameTokenizer;
use tracing::warn;

/// Strips database/table names down to ASCII alphanumerics before any
/// path use.
pub fn clean_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Physical locations of one table's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub db_dir: PathBuf,
    pub base: PathBuf,
    pub meta: PathBuf,
    pub append: PathBuf,
    pub lock: PathBuf,
}

/// Maps logical database/table names to on-disk names.
///
/// Plain mode is the identity on sanitized names and touches no index
/// files. Encrypted mode derives tokens through the [`NameTokenizer`] and
/// persists assignments in the global and per-database [`NameIndex`]es so
/// listing operations can recover plaintext names.
pub struct NameService {
    root: PathBuf,
    ext: &'static str,
    tokenizer: Option<NameTokenizer>,
}

impl NameService {
    pub fn new(config: &GbdbConfig) -> Result<Self, GbdbError> {
        let tokenizer = if config.encrypt {
            let secret = config.secret_bytes().ok_or_else(|| GbdbError::InvalidConfig {
                message: "encryption enabled but no secret configured".into(),
            })?;
            Some(NameTokenizer::new(secret)?)
        } else {
            None
        };
        Ok(Self {
            root: config.root.clone(),
            ext: config.data_extension(),
            tokenizer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Global database-name index; `None` in plain mode.
    pub fn db_index(&self) -> Option<NameIndex> {
        let tokenizer = self.tokenizer.as_ref()?;
        let filename = format!("{}{}", tokenizer.db_index_token(), self.ext);
        Some(NameIndex::at(self.root.join(filename)))
    }

    /// Per-database table-name index; `None` in plain mode.
    pub fn table_index(&self, db_dir: &Path) -> Option<NameIndex> {
        Some(NameIndex::at(db_dir.join(self.table_index_filename()?)))
    }

    /// File name of the per-database table index; `None` in plain mode.
    pub fn table_index_filename(&self) -> Option<String> {
        let tokenizer = self.tokenizer.as_ref()?;
        Some(format!("{}{}", tokenizer.table_index_token(), self.ext))
    }

    /// Resolves a database name to its on-disk directory name. With
    /// `ensure`, encrypted mode assigns and persists a token for a new
    /// name; plain mode is the identity either way.
    pub fn resolve_db(
        &self,
        codec: &Codec,
        db: &str,
        ensure: bool,
    ) -> Result<Option<String>, GbdbError> {
        let db = clean_name(db);
        let Some(tokenizer) = &self.tokenizer else {
            return Ok(Some(db));
        };
        let index = self.db_index().expect("encrypted mode has a db index");
        index.resolve(codec, &db, ensure, |attempt| tokenizer.db_token(&db, attempt))
    }

    /// Resolves a table name to its on-disk file stem within `db_dir`.
    pub fn resolve_table(
        &self,
        codec: &Codec,
        db: &str,
        db_dir: &Path,
        table: &str,
        ensure: bool,
    ) -> Result<Option<String>, GbdbError> {
        let db = clean_name(db);
        let table = clean_name(table);
        let Some(tokenizer) = &self.tokenizer else {
            return Ok(Some(table));
        };
        let index = self
            .table_index(db_dir)
            .expect("encrypted mode has a table index");
        index.resolve(codec, &table, ensure, |attempt| {
            tokenizer.table_token(&db, &table, attempt)
        })
    }

    /// Builds the physical paths for a resolved table stem.
    pub fn table_paths(&self, db_dirname: &str, table_stem: &str) -> TablePaths {
        let db_dir = self.root.join(db_dirname);
        let (meta_stem, append_stem) = match &self.tokenizer {
            Some(tokenizer) => (
                tokenizer.meta_token(table_stem),
                tokenizer.append_token(table_stem),
            ),
            None => (
                format!("__meta__{table_stem}"),
                format!("__append__{table_stem}"),
            ),
        };
        let base = db_dir.join(format!("{table_stem}{}", self.ext));
        let lock = db_dir.join(format!("{table_stem}{}.lock", self.ext));
        TablePaths {
            meta: db_dir.join(format!("{meta_stem}{}", self.ext)),
            append: db_dir.join(format!("{append_stem}{}", self.ext)),
            base,
            lock,
            db_dir,
        }
    }

    /// All databases as `(plaintext, dirname)` pairs. Encrypted mode walks
    /// the index and silently skips entries whose directory is gone.
    pub fn list_db_entries(&self, codec: &Codec) -> Result<Vec<(String, String)>, GbdbError> {
        match self.db_index() {
            None => {
                let mut out = Vec::new();
                let Ok(entries) = std::fs::read_dir(&self.root) else {
                    return Ok(out);
                };
                for entry in entries {
                    let entry = entry?;
                    if entry.file_type()?.is_dir() {
                        let name = entry.file_name().to_string_lossy().to_string();
                        out.push((name.clone(), name));
                    }
                }
                out.sort();
                Ok(out)
            }
            Some(index) => {
                let mut out = Vec::new();
                for (plain, token) in index.all(codec)? {
                    if self.root.join(&token).is_dir() {
                        out.push((plain, token));
                    } else {
                        warn!(db = %plain, "skipping stale db index entry");
                    }
                }
                Ok(out)
            }
        }
    }

    /// All tables of a database as `(plaintext, file stem)` pairs.
    pub fn list_table_entries(
        &self,
        codec: &Codec,
        db_dirname: &str,
    ) -> Result<Vec<(String, String)>, GbdbError> {
        let db_dir = self.root.join(db_dirname);
        match self.table_index(&db_dir) {
            None => {
                let mut out = Vec::new();
                let Ok(entries) = std::fs::read_dir(&db_dir) else {
                    return Ok(out);
                };
                for entry in entries {
                    let name = entry?.file_name().to_string_lossy().to_string();
                    let Some(stem) = name.strip_suffix(self.ext) else {
                        continue;
                    };
                    if stem.starts_with("__meta__") || stem.starts_with("__append__") {
                        continue;
                    }
                    out.push((stem.to_string(), stem.to_string()));
                }
                out.sort();
                Ok(out)
            }
            Some(index) => {
                let mut out = Vec::new();
                for (plain, token) in index.all(codec)? {
                    if db_dir.join(format!("{token}{}", self.ext)).is_file() {
                        out.push((plain, token));
                    } else {
                        warn!(table = %plain, "skipping stale table index entry");
                    }
                }
                Ok(out)
            }
        }
    }
}
