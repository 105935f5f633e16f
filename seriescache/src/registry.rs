//! Global registry of dimension display names.
//!
//! Maps dimension ids (for example geography ids) to the names the source
//! reports for them. The registry only grows: entries are added or renamed
//! as fetch responses reveal them, never removed.
//!
//! Independent orchestrators may share one registry file. On flush the file
//! is re-read and this process's pending entries are applied on top, so
//! entries learned elsewhere survive. Conflicting names resolve to whichever
//! flush ran last.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::storage::{atomic, CacheLayout};
use crate::table::DimensionId;

const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    dimensions: BTreeMap<DimensionId, String>,
}

/// Persistent dimension id to name map.
#[derive(Debug)]
pub struct DimensionRegistry {
    path: PathBuf,
    entries: BTreeMap<DimensionId, String>,
    pending: BTreeMap<DimensionId, String>,
}

impl DimensionRegistry {
    /// Open the registry at its standard location under `layout`.
    pub fn open(layout: &CacheLayout) -> CacheResult<Self> {
        Self::load(layout.registry_path())
    }

    /// Open the registry stored at `path`.
    ///
    /// A missing file yields an empty registry; a corrupt one is logged and
    /// treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> CacheResult<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(Self {
            path,
            entries,
            pending: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup(&self, id: DimensionId) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    /// Record a name for `id`. Returns true if the registry changed.
    pub fn learn(&mut self, id: DimensionId, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.entries.get(&id) == Some(&name) {
            return false;
        }
        self.entries.insert(id, name.clone());
        self.pending.insert(id, name);
        true
    }

    /// True if there are learned entries not yet flushed.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Persist pending entries. Returns false if there was nothing to write.
    pub fn flush(&mut self) -> CacheResult<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }

        atomic::sweep_orphans(atomic::parent_dir(&self.path));
        let mut merged = read_entries(&self.path)?;
        merged.extend(self.pending.iter().map(|(id, name)| (*id, name.clone())));

        let file = RegistryFile {
            version: REGISTRY_VERSION,
            dimensions: merged,
        };
        let bytes =
            serde_json::to_vec_pretty(&file).map_err(|e| CacheError::corrupt(&self.path, e))?;
        atomic::write(&self.path, &bytes)?;

        debug!(
            path = %self.path.display(),
            learned = self.pending.len(),
            total = file.dimensions.len(),
            "Flushed dimension registry"
        );
        self.entries = file.dimensions;
        self.pending.clear();
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DimensionId, &str)> {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

fn read_entries(path: &Path) -> CacheResult<BTreeMap<DimensionId, String>> {
    let Some(bytes) = atomic::read(path)? else {
        return Ok(BTreeMap::new());
    };
    match serde_json::from_slice::<RegistryFile>(&bytes) {
        Ok(file) => Ok(file.dimensions),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt dimension registry");
            Ok(BTreeMap::new())
        }
    }
}
