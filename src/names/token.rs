use crate::crypt::encoding::b64url_encode;
use crate::error::GbdbError;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/// Prefix making tokens visually distinct from plaintext names.
pub const TOKEN_PREFIX: &str = "gb_";

pub const DB_INDEX_NAME: &str = "__db_index__";
pub const TABLE_INDEX_NAME: &str = "__table_index__";

/// Token namespaces. Keeping kinds separate means a database, a table, and
/// a meta file can never collide even for equal plaintext inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Db,
    Tbl,
    Meta,
}

impl Namespace {
    fn as_str(self) -> &'static str {
        match self {
            Namespace::Db => "db",
            Namespace::Tbl => "tbl",
            Namespace::Meta => "meta",
        }
    }
}

/// Deterministic, secret-keyed, non-reversible mapping from plaintext
/// database/table names to filesystem-safe tokens.
///
/// `token(p, ns) = "gb_" + b64url(HMAC-SHA256(key, ns + "|" + p))`. The same
/// input always yields the same token, so files can be relocated without
/// rebuilding the index from content.
pub struct NameTokenizer {
    mac: Hmac<Sha256>,
}

impl NameTokenizer {
    pub fn new(secret: &[u8]) -> Result<Self, GbdbError> {
        // Key the MAC with the derived digest, not the raw secret.
        let key = Sha256::digest(secret);
        let mac = Hmac::<Sha256>::new_from_slice(&key).map_err(|e| GbdbError::InvalidConfig {
            message: format!("invalid token key: {e}"),
        })?;
        Ok(Self { mac })
    }

    pub fn token(&self, plaintext: &str, ns: Namespace) -> String {
        let mut mac = self.mac.clone();
        mac.update(ns.as_str().as_bytes());
        mac.update(b"|");
        mac.update(plaintext.as_bytes());
        format!("{TOKEN_PREFIX}{}", b64url_encode(&mac.finalize().into_bytes()))
    }

    /// Nth candidate token for a plaintext name: the first candidate is the
    /// plain derivation, later ones append a `#2`, `#3`, ... disambiguator.
    /// Used by the name index to resolve collisions deterministically.
    fn token_nth(&self, plaintext: &str, ns: Namespace, attempt: u32) -> String {
        if attempt <= 1 {
            self.token(plaintext, ns)
        } else {
            self.token(&format!("{plaintext}#{attempt}"), ns)
        }
    }

    /// Candidate directory token for a database name.
    pub fn db_token(&self, db: &str, attempt: u32) -> String {
        self.token_nth(&format!("db:{db}"), Namespace::Db, attempt)
    }

    /// Candidate file-stem token for a table name, scoped to its database.
    pub fn table_token(&self, db: &str, table: &str, attempt: u32) -> String {
        self.token_nth(&format!("tbl:{db}|{table}"), Namespace::Tbl, attempt)
    }

    /// Meta-file token, derived from the table token so the meta file moves
    /// with its table.
    pub fn meta_token(&self, table_token: &str) -> String {
        self.token(&format!("__meta__|{table_token}"), Namespace::Meta)
    }

    pub fn append_token(&self, table_token: &str) -> String {
        self.token(&format!("__append__|{table_token}"), Namespace::Meta)
    }

    pub fn db_index_token(&self) -> String {
        self.token(DB_INDEX_NAME, Namespace::Meta)
    }

    pub fn table_index_token(&self) -> String {
        self.token(TABLE_INDEX_NAME, Namespace::Meta)
    }
}
