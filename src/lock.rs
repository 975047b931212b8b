//! Run lock: one dadump at a time per dump directory.
//!
//! An advisory write lock on `.dadump.lock` inside the dump directory. The
//! lock is held for the whole run and the OS releases it when the process
//! exits, cleanly or not, so there is no stale-lock bookkeeping.

use crate::error::{DumpError, Error, IoError, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file name inside the dump directory
pub const LOCK_FILE: &str = ".dadump.lock";

/// Owns the lock file handle. Call `try_acquire` and keep the returned guard
/// alive for as long as exclusive access is needed.
pub struct RunLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl RunLock {
    /// Open (creating if needed) the lock file for a dump directory
    pub fn new(dump_dir: &Path) -> Result<Self> {
        fs::create_dir_all(dump_dir).map_err(|e| {
            Error::Io(IoError::DirectoryCreateFailed {
                path: dump_dir.display().to_string(),
                source: e,
            })
        })?;

        let path = dump_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                Error::Io(IoError::FileWriteFailed {
                    path: path.display().to_string(),
                    source: e,
                })
            })?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Take the exclusive lock without blocking. Fails immediately when
    /// another dadump process holds it.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        match self.lock.try_write() {
            Ok(guard) => {
                debug!("acquired run lock at {}", self.path.display());
                Ok(guard)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(Error::Dump(
                DumpError::LockHeld(self.path.display().to_string()),
            )),
            Err(e) => Err(Error::Io(IoError::Other(e))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = TempDir::new().unwrap();
        let mut lock = RunLock::new(dir.path()).unwrap();
        let _guard = lock.try_acquire().unwrap();

        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let mut first = RunLock::new(dir.path()).unwrap();
        let _guard = first.try_acquire().unwrap();

        let mut second = RunLock::new(dir.path()).unwrap();
        let err = second.try_acquire().unwrap_err();
        assert!(matches!(err, Error::Dump(DumpError::LockHeld(_))));
        assert!(err.to_string().contains(LOCK_FILE));
    }

    #[test]
    fn test_reacquire_after_release() {
        let dir = TempDir::new().unwrap();
        let mut first = RunLock::new(dir.path()).unwrap();
        drop(first.try_acquire().unwrap());

        let mut second = RunLock::new(dir.path()).unwrap();
        assert!(second.try_acquire().is_ok());
    }

    #[test]
    fn test_creates_missing_dump_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("var/lib/dadump");

        let mut lock = RunLock::new(&nested).unwrap();
        let _guard = lock.try_acquire().unwrap();
        assert!(nested.join(LOCK_FILE).exists());
    }
}
