//! Write-side file helpers shared by every component that rewrites a file.
//!
//! Reads never lock. Writers that read-modify-write a single file take the
//! per-path lock from [`FileLocks`] for the whole cycle and persist through
//! [`write_atomic`], so in-process writers serialize and readers never see a
//! half-written file.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct FileLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the write lock for `path`.
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.lock_for(path);
        let _guard: MutexGuard<'_, ()> = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Writes `contents` to a temp file beside `path`, then renames it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Last-modified time of a file, or `None` when it does not exist.
pub fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    meta.modified().ok().map(DateTime::<Utc>::from)
}
