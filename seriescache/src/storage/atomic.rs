//! Crash-safe file replacement.
//!
//! Every artifact is written to a uniquely named sibling temp file, synced,
//! and renamed over the target. A reader therefore sees either the old
//! complete file or the new complete file, never a partial one. Temp files
//! left behind by a crash are named `.{target}.XXXXXX.tmp` and swept by
//! [`sweep_stale_temps`].

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};

const TEMP_SUFFIX: &str = ".tmp";

/// Temp files older than this are assumed orphaned by a crash.
pub const ORPHAN_AGE: Duration = Duration::from_secs(3600);

/// Read a whole file, `None` if it does not exist.
pub fn read(path: &Path) -> CacheResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::storage(path, e)),
    }
}

/// Atomically replace `path` with `bytes`.
pub fn write(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let mut pending = AtomicWrite::begin(path)?;
    pending.write_all(bytes)?;
    pending.commit()
}

/// Remove a file; a missing file is not an error.
pub fn remove(path: &Path) -> CacheResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::storage(path, e)),
    }
}

/// An in-progress atomic replacement of one file.
///
/// Dropping it without calling [`commit`](Self::commit) deletes the temp
/// file and leaves the target untouched.
pub struct AtomicWrite {
    target: PathBuf,
    temp: NamedTempFile,
}

impl AtomicWrite {
    /// Create the temp file next to `target`, creating parent directories.
    pub fn begin(target: &Path) -> CacheResult<Self> {
        let parent = parent_dir(target);
        fs::create_dir_all(parent).map_err(|e| CacheError::storage(parent, e))?;

        let prefix = format!(".{}.", file_name(target));
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| CacheError::storage(parent, e))?;

        Ok(Self {
            target: target.to_path_buf(),
            temp,
        })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> CacheResult<()> {
        let path = self.temp.path().to_path_buf();
        self.temp
            .write_all(bytes)
            .map_err(|e| CacheError::storage(path, e))
    }

    /// Path of the temp file being written.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Sync and rename the temp file over the target.
    pub fn commit(mut self) -> CacheResult<()> {
        let temp_path = self.temp.path().to_path_buf();
        self.temp
            .flush()
            .and_then(|_| self.temp.as_file().sync_all())
            .map_err(|e| CacheError::storage(&temp_path, e))?;

        self.temp
            .persist(&self.target)
            .map_err(|e| CacheError::storage(&self.target, e.error))?;

        sync_dir(parent_dir(&self.target));
        debug!(path = %self.target.display(), "Committed cache artifact");
        Ok(())
    }

    /// Keep the temp file on disk without renaming it.
    #[cfg(test)]
    pub(crate) fn abandon(self) -> PathBuf {
        let (_, path) = self.temp.keep().expect("keep temp file");
        path
    }
}

/// Delete temp files in `dir` older than `older_than`.
///
/// Returns the number of files removed. Failures to remove individual files
/// are logged and skipped.
pub fn sweep_stale_temps(dir: &Path, older_than: Duration) -> CacheResult<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(CacheError::storage(dir, e)),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with('.') && name.ends_with(TEMP_SUFFIX)) {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if !age.is_some_and(|age| age > older_than) {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed orphaned temp file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
        }
    }
    Ok(removed)
}

/// Sweep orphans older than [`ORPHAN_AGE`] from `dir`, logging failures.
pub fn sweep_orphans(dir: &Path) {
    if let Err(e) = sweep_stale_temps(dir, ORPHAN_AGE) {
        warn!(path = %dir.display(), error = %e, "Temp file sweep failed");
    }
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Best effort: the rename is already visible to readers.
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        debug!(path = %dir.display(), error = %e, "Directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
