//! SeriesCache - local coverage-aware cache for chunked time-series sources
//!
//! This library keeps a per-indicator on-disk copy of time-indexed,
//! column-sparse data pulled from a remote, rate-limited source whose
//! recent values are revised after publication. It decides which parts of a
//! request are already known-good, fetches only the holes (plus the trailing
//! window the source may still correct), merges the results without losing
//! previously cached data, and persists every artifact crash-safely.
//!
//! # Architecture
//!
//! ```text
//! FetchOrchestrator
//!         │
//!         ├── migration        (legacy flat file → per-indicator directory)
//!         ├── FreshnessPolicy  (Fresh / PartialRefetchNeeded / StaleOrMissing)
//!         ├── detect_gaps      (per-column holes, grouped into fetch tasks)
//!         ├── Fetcher/Decoder  (external collaborators)
//!         ├── merge_chunk      (sub-range replacement + coverage union)
//!         ├── DimensionRegistry
//!         └── IndicatorStore ── atomic (temp file + rename)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use seriescache::{
//!     CacheConfig, CacheLayout, DimensionFilter, DimensionRegistry, FetchOrchestrator,
//!     IndicatorRef, TimeRange, ValuesDecoder,
//! };
//!
//! let config = CacheConfig::default();
//! let layout = CacheLayout::new(&config.cache_dir);
//! let registry = DimensionRegistry::open(&layout)?;
//!
//! let mut cache = FetchOrchestrator::new(
//!     &layout,
//!     IndicatorRef::new("indicators", 600),
//!     Arc::new(my_http_fetcher),
//!     Arc::new(ValuesDecoder::new()),
//!     registry,
//!     config,
//! );
//!
//! let table = cache.get(&[600], &DimensionFilter::Only(vec![3]), TimeRange::new(start, end))?;
//! ```

pub mod catalog;
pub mod clock;
pub mod config;
pub mod coverage;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod gaps;
pub mod interval;
pub mod maintenance;
pub mod merge;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod table;

pub use catalog::{CatalogEntry, CatalogStore};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{default_cache_dir, default_config_path, CacheConfig, ConfigError};
pub use coverage::{CoverageMap, CoverageMetadata};
pub use error::{CacheError, CacheResult};
pub use fetch::{Decoder, FetchError, Fetcher, ValuesDecoder};
pub use freshness::{Freshness, FreshnessPolicy};
pub use gaps::{covers_all, detect_gaps, Batching, FetchTask};
pub use interval::{CoverageSet, TimeRange, Timestamp};
pub use maintenance::{CacheStatus, ClearScope};
pub use merge::{merge_chunk, FetchedChunk, MergeOutcome};
pub use orchestrator::{DimensionFilter, FetchOrchestrator, FetchReport};
pub use registry::DimensionRegistry;
pub use storage::{CacheLayout, IndicatorRef, IndicatorState, IndicatorStore, MigrationOutcome};
pub use table::{Cell, ColumnKey, DimensionId, Observation, SeriesId, SeriesTable};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
