use crate::crypt::Codec;
use crate::error::GbdbError;
use crate::fsio;
use crate::table::row::HEADER_SENTINEL;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use tracing::warn;

/// Persisted `(plaintext, token)` mapping, stored as a tiny table
/// (header row plus `{id, plain, token}` rows) through the same atomic
/// write primitive as ordinary tables.
///
/// One index at the database root maps database names to tokens; one
/// inside each database directory maps table names. Only used in
/// encrypted mode; plain mode resolves names by identity and creates no
/// index files.
pub struct NameIndex {
    path: PathBuf,
}

impl NameIndex {
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// All live `(plaintext, token)` pairs, in insertion order.
    pub fn all(&self, codec: &Codec) -> Result<Vec<(String, String)>, GbdbError> {
        let Some(bytes) = fsio::read_file(&self.path)? else {
            return Ok(Vec::new());
        };
        let rows: Vec<Value> = match codec.decode_doc(&bytes) {
            Ok(rows) => rows,
            Err(GbdbError::Io(e)) => return Err(GbdbError::Io(e)),
            Err(e) => {
                // An unreadable index is treated as empty, same as any
                // other undecodable record.
                warn!(path = %self.path.display(), error = %e, "name index unreadable");
                return Ok(Vec::new());
            }
        };

        let mut entries = Vec::new();
        for row in rows.iter().skip(1) {
            let (Some(plain), Some(token)) = (
                row.get("plain").and_then(Value::as_str),
                row.get("token").and_then(Value::as_str),
            ) else {
                continue;
            };
            if !plain.is_empty() && !token.is_empty() {
                entries.push((plain.to_string(), token.to_string()));
            }
        }
        Ok(entries)
    }

    /// Looks up the token for `plain`. With `ensure`, a missing entry is
    /// created: candidate tokens come from `derive(attempt)` (attempt 1 is
    /// the plain derivation, later attempts are disambiguated) and the
    /// first one not already taken by another name is persisted. A token,
    /// once assigned, never changes for the lifetime of the name.
    pub fn resolve(
        &self,
        codec: &Codec,
        plain: &str,
        ensure: bool,
        derive: impl Fn(u32) -> String,
    ) -> Result<Option<String>, GbdbError> {
        let mut entries = self.all(codec)?;
        if let Some((_, token)) = entries.iter().find(|(p, _)| p == plain) {
            return Ok(Some(token.clone()));
        }
        if !ensure {
            return Ok(None);
        }

        let mut attempt = 1u32;
        let token = loop {
            let candidate = derive(attempt);
            if !entries.iter().any(|(_, t)| *t == candidate) {
                break candidate;
            }
            attempt += 1;
        };

        entries.push((plain.to_string(), token.clone()));
        self.save(codec, &entries)?;
        Ok(Some(token))
    }

    /// Removes the entry for `plain`; true when something was dropped.
    pub fn drop_name(&self, codec: &Codec, plain: &str) -> Result<bool, GbdbError> {
        let mut entries = self.all(codec)?;
        let before = entries.len();
        entries.retain(|(p, _)| p != plain);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(codec, &entries)?;
        Ok(true)
    }

    fn save(&self, codec: &Codec, entries: &[(String, String)]) -> Result<(), GbdbError> {
        let mut rows: Vec<Value> = Vec::with_capacity(entries.len() + 1);
        rows.push(json!({
            "id": -1,
            "plain": HEADER_SENTINEL,
            "token": HEADER_SENTINEL,
        }));
        for (id, (plain, token)) in entries.iter().enumerate() {
            let mut row = Map::new();
            row.insert("id".into(), json!(id));
            row.insert("plain".into(), json!(plain));
            row.insert("token".into(), json!(token));
            rows.push(Value::Object(row));
        }
        let bytes = codec.encode_doc(&rows)?;
        fsio::write_atomic(&self.path, &bytes)
    }
}
