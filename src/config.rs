use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Runtime configuration for a GBDB instance.
///
/// The engine carries no global state; everything it needs is captured
/// here at construction time.
#[derive(Debug, Clone)]
pub struct GbdbConfig {
    /// Directory under which database directories live.
    pub root: PathBuf,
    /// Secret used to derive the content-encryption and name-token keys.
    /// Wrapped in Arc<Zeroizing<>> so the material is zeroed from memory
    /// when the last reference is dropped.
    pub secret: Option<Arc<Zeroizing<Vec<u8>>>>,
    /// Encrypt table contents and tokenize database/table names on disk.
    pub encrypt: bool,
    /// Allow decoding of unprefixed legacy payloads (AES-CBC, fixed IV,
    /// no integrity tag). Off by default; when off such payloads fail
    /// with a Tampered error.
    pub legacy_decode: bool,
    /// Pretty-print JSON documents before (optional) encryption.
    pub pretty: bool,
    /// Upper bound on waiting for a table lock.
    pub lock_timeout: Duration,
}

impl Default for GbdbConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("gbdb"),
            secret: None,
            encrypt: false,
            legacy_decode: false,
            pretty: false,
            lock_timeout: Duration::from_secs(10),
        }
    }
}

impl GbdbConfig {
    /// Plain-text profile: names and contents stored as-is, `.json` files.
    pub fn plain(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Encrypted profile: tokenized names, encrypted contents, `.db` files.
    pub fn encrypted(root: impl Into<PathBuf>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            root: root.into(),
            secret: Some(Arc::new(Zeroizing::new(secret.into()))),
            encrypt: true,
            ..Self::default()
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_legacy_decode(mut self, enabled: bool) -> Self {
        self.legacy_decode = enabled;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// File extension for data files: `.db` when encrypting, `.json` otherwise.
    pub fn data_extension(&self) -> &'static str {
        if self.encrypt {
            ".db"
        } else {
            ".json"
        }
    }

    pub fn secret_bytes(&self) -> Option<&[u8]> {
        self.secret.as_ref().map(|arc| &***arc as &[u8])
    }
}
