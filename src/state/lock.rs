// src/state/lock.rs

//! Exclusive advisory lock on the store's sibling lock file.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::errors::StoreError;

/// Holds an exclusive lock on a lock file until dropped.
///
/// The lock is taken on a freshly opened file description, so it excludes
/// other processes on the host as well as other handles inside this process.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Block until the exclusive lock on `path` is acquired.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_err = |source| StoreError::Lock {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(lock_err)?;
        file.lock().map_err(lock_err)?;

        trace!(path = ?path, "state lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        trace!(path = ?self.path, "state lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn second_holder_waits_for_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let first = LockGuard::acquire(&path).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let handle = {
            let path = path.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _second = LockGuard::acquire(&path).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(first);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
