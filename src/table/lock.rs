use crate::error::GbdbError;
use crate::fsio;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FLOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-table mutual exclusion.
///
/// Two layers: an in-process mutex keyed by lock-file path (flock does not
/// exclude two handles within one process on all platforms) and an OS
/// advisory exclusive lock on the table's `.lock` file for cross-process
/// exclusion. The lock wraps the entire read-materialize-mutate-write
/// sequence of one operation, never just the final write.
///
/// Lock files are created lazily and deleted only with their table.
/// Acquisition is bounded: waiting past the configured timeout surfaces
/// `LockTimeout` instead of blocking forever.
pub struct LockRegistry {
    slots: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_lock<T>(
        &self,
        lock_path: &Path,
        timeout: Duration,
        f: impl FnOnce() -> Result<T, GbdbError>,
    ) -> Result<T, GbdbError> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(lock_path.to_path_buf()).or_default().clone()
        };

        let deadline = Instant::now() + timeout;
        let Some(_guard) = slot.try_lock_for(timeout) else {
            return Err(timeout_error(lock_path));
        };

        if let Some(dir) = lock_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path)?;
        loop {
            if fsio::try_flock_exclusive(&file)? {
                break;
            }
            if Instant::now() >= deadline {
                return Err(timeout_error(lock_path));
            }
            std::thread::sleep(FLOCK_POLL_INTERVAL);
        }

        let result = f();
        let _ = fsio::funlock(&file);
        result
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn timeout_error(lock_path: &Path) -> GbdbError {
    GbdbError::LockTimeout {
        path: lock_path.display().to_string(),
    }
}
