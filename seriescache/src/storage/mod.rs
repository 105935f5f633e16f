//! Persistent storage for cached indicators.
//!
//! - [`atomic`]: temp-file-and-rename writes and orphan sweeping
//! - [`layout`]: where each artifact lives under the cache root
//! - [`indicator`]: load and save one indicator's table and metadata
//! - [`migration`]: fold legacy flat files into the current layout

pub mod atomic;
mod indicator;
mod layout;
mod migration;

pub use indicator::{IndicatorState, IndicatorStore};
pub use layout::{CacheLayout, IndicatorPaths, IndicatorRef};
pub use migration::{migrate_if_needed, LegacyRecord, MigrationOutcome};
