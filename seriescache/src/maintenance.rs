//! Cache inspection and clearing.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CacheError, CacheResult};
use crate::storage::{CacheLayout, IndicatorRef};

/// Summary of what is on disk under a cache root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatus {
    pub path: PathBuf,
    pub files: usize,
    pub total_bytes: u64,
    /// File count per endpoint directory. Files directly under the root,
    /// such as the dimension registry, are not attributed to any endpoint.
    pub endpoints: BTreeMap<String, usize>,
}

/// What to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Endpoint(String),
    Indicator(IndicatorRef),
}

/// Collect statistics for the cache root.
pub fn status(layout: &CacheLayout) -> CacheResult<CacheStatus> {
    let root = layout.root();
    let mut status = CacheStatus {
        path: root.to_path_buf(),
        ..Default::default()
    };

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(status),
        Err(e) => return Err(CacheError::storage(root, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| CacheError::storage(root, e))?;
        let path = entry.path();
        let (files, bytes) = tally(&path)?;
        status.files += files;
        status.total_bytes += bytes;
        if path.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            status.endpoints.insert(name, files);
        }
    }
    Ok(status)
}

/// Remove cached files in `scope`. Returns the number of files removed.
pub fn clear(layout: &CacheLayout, scope: &ClearScope) -> CacheResult<usize> {
    let mut removed = 0;
    match scope {
        ClearScope::All => {
            removed += remove_tree(layout.root())?;
        }
        ClearScope::Endpoint(endpoint) => {
            removed += remove_tree(&layout.endpoint_dir(endpoint))?;
        }
        ClearScope::Indicator(indicator) => {
            let paths = layout.indicator(indicator);
            removed += remove_tree(&paths.dir)?;
            removed += remove_tree(&paths.legacy)?;
        }
    }

    info!(scope = ?scope, files = removed, "Cleared cache");
    Ok(removed)
}

/// Count files and bytes under `path`, which may be a file or directory.
fn tally(path: &Path) -> CacheResult<(usize, u64)> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(CacheError::storage(path, e)),
    };
    if !metadata.is_dir() {
        return Ok((1, metadata.len()));
    }

    let mut files = 0;
    let mut bytes = 0;
    for entry in fs::read_dir(path).map_err(|e| CacheError::storage(path, e))? {
        let entry = entry.map_err(|e| CacheError::storage(path, e))?;
        let (f, b) = tally(&entry.path())?;
        files += f;
        bytes += b;
    }
    Ok((files, bytes))
}

fn remove_tree(path: &Path) -> CacheResult<usize> {
    let (files, _) = tally(path)?;
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(files),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(CacheError::storage(path, e)),
    }
}
