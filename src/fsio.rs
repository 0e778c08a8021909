//! Filesystem primitives: atomic whole-file replacement, durable appends,
//! and advisory file locking.
//!
//! Every whole-file mutation goes through [`write_atomic`]: write to a
//! uniquely named temp file in the target directory, fsync, rename over the
//! target, fsync the directory. A reader never observes a partial file and
//! a crash mid-write leaves the previous version intact.

use crate::error::GbdbError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), GbdbError> {
    let dir = path.parent().ok_or_else(|| {
        GbdbError::Io(io::Error::other(format!(
            "path has no parent directory: {}",
            path.display()
        )))
    })?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| GbdbError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

/// Reads a whole file; `Ok(None)` when it does not exist.
pub fn read_file(path: &Path) -> Result<Option<Vec<u8>>, GbdbError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GbdbError::Io(e)),
    }
}

/// Appends one line to a log file. The write itself holds an exclusive
/// advisory lock on the handle (in addition to the caller's table lock)
/// and is synced before returning. Append logs are never renamed.
pub fn append_line(path: &Path, line: &str) -> Result<(), GbdbError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    flock_exclusive(&file)?;
    let result = (|| {
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        file.sync_data()
    })();
    let _ = funlock(&file);
    result?;
    Ok(())
}

pub fn fsync_dir(path: &Path) -> Result<(), GbdbError> {
    // Windows cannot open directories as plain files; the rename itself is
    // still atomic there.
    #[cfg(unix)]
    {
        let dir = File::open(path)?;
        dir.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(unix)]
pub(crate) fn flock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        return Ok(false);
    }
    Err(err)
}

#[cfg(unix)]
pub(crate) fn funlock(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// Non-Unix platforms fall back to the in-process lock registry; the file
// handle still serializes writers within this process.
#[cfg(not(unix))]
pub(crate) fn flock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn try_flock_exclusive(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
pub(crate) fn funlock(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{append_line, read_file, write_atomic};
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_previous_content() {
        let dir = tempdir().expect("temp");
        let path = dir.path().join("table.json");
        write_atomic(&path, b"[1]").expect("write 1");
        write_atomic(&path, b"[1,2]").expect("write 2");
        assert_eq!(read_file(&path).expect("read"), Some(b"[1,2]".to_vec()));
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempdir().expect("temp");
        write_atomic(&dir.path().join("t.json"), b"[]").expect("write");
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("t.json")]);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().expect("temp");
        assert_eq!(read_file(&dir.path().join("nope")).expect("read"), None);
    }

    #[test]
    fn append_builds_newline_delimited_log() {
        let dir = tempdir().expect("temp");
        let path = dir.path().join("log");
        append_line(&path, "one").expect("append");
        append_line(&path, "two").expect("append");
        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(content, "one\ntwo\n");
    }
}
