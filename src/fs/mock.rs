// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    mtime: SystemTime,
}

/// In-memory filesystem with explicit modification times.
///
/// Every write without an explicit time gets a logical clock tick, so later
/// writes are always strictly newer than earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockFile>>>,
    clock: Arc<Mutex<u64>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file, stamping it with the next clock tick.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mtime = self.tick();
        self.add_file_at(path, content, mtime);
    }

    /// Create or overwrite a file with an explicit modification time.
    pub fn add_file_at(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        mtime: SystemTime,
    ) {
        let mut files = self.files.lock().unwrap();
        files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                content: content.into(),
                mtime,
            },
        );
    }

    /// Bump the modification time of an existing file (or create it empty).
    pub fn touch(&self, path: impl AsRef<Path>) {
        let mtime = self.tick();
        let mut files = self.files.lock().unwrap();
        files
            .entry(path.as_ref().to_path_buf())
            .and_modify(|f| f.mtime = mtime)
            .or_insert(MockFile {
                content: Vec::new(),
                mtime,
            });
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let mut files = self.files.lock().unwrap();
        files.remove(path.as_ref());
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.lock().unwrap();
        *clock += 1;
        UNIX_EPOCH + Duration::from_secs(1_000_000 + *clock)
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(file) => String::from_utf8(file.content.clone())
                .map_err(|e| anyhow!("Invalid UTF-8: {}", e)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(path)
    }

    fn modified(&self, path: &Path) -> Result<Option<SystemTime>> {
        let files = self.files.lock().unwrap();
        Ok(files.get(path).map(|f| f.mtime))
    }

    fn remove_file(&self, path: &Path) -> Result<bool> {
        let mut files = self.files.lock().unwrap();
        Ok(files.remove(path).is_some())
    }
}
