//! On-disk layout of the cache root.
//!
//! ```text
//! {root}/
//! ├── dimensions.json              dimension id → display name
//! └── {endpoint}/
//!     ├── catalog.json             cached endpoint listing
//!     ├── {id}.bin                 legacy flat file (migrated on first read)
//!     └── {id}/
//!         ├── data.bin             series table
//!         └── meta.json            coverage metadata
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const TABLE_FILE: &str = "data.bin";
const METADATA_FILE: &str = "meta.json";
const CATALOG_FILE: &str = "catalog.json";
const REGISTRY_FILE: &str = "dimensions.json";
const LEGACY_EXTENSION: &str = "bin";

/// An indicator within a named endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndicatorRef {
    pub endpoint: String,
    pub id: u32,
}

impl IndicatorRef {
    pub fn new(endpoint: impl Into<String>, id: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            id,
        }
    }
}

impl fmt::Display for IndicatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.endpoint, self.id)
    }
}

/// Paths of one indicator's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorPaths {
    pub dir: PathBuf,
    pub table: PathBuf,
    pub metadata: PathBuf,
    pub legacy: PathBuf,
}

/// Resolves artifact paths under a cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn endpoint_dir(&self, endpoint: &str) -> PathBuf {
        self.root.join(endpoint)
    }

    pub fn indicator(&self, indicator: &IndicatorRef) -> IndicatorPaths {
        let endpoint = self.endpoint_dir(&indicator.endpoint);
        let dir = endpoint.join(indicator.id.to_string());
        IndicatorPaths {
            table: dir.join(TABLE_FILE),
            metadata: dir.join(METADATA_FILE),
            legacy: endpoint.join(format!("{}.{}", indicator.id, LEGACY_EXTENSION)),
            dir,
        }
    }

    pub fn catalog_path(&self, endpoint: &str) -> PathBuf {
        self.endpoint_dir(endpoint).join(CATALOG_FILE)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }
}
