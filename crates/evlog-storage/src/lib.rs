//! # evlog storage
//!
//! Local structured store for ingested event records, backed by redb.
//!
//! ## Components
//!
//! - [`EventStore`]: the database with header, payload and dimension tables
//! - [`ImportJob`]: one write transaction ingesting a batch of raw records
//! - [`ProviderInfoCache`], [`TaskInfoCache`], [`OperationInfoCache`]:
//!   overlay caches normalizing records into dimension-keyed rows
//! - [`ChunkedScanner`]: bounded-memory ordered scans over stored rows
//!
//! ## Example
//!
//! ```ignore
//! use evlog_storage::{ConflictPolicy, EventStore, ScanOptions, StoreConfig};
//!
//! let store = EventStore::open(StoreConfig::writable("./data/security.redb"))?;
//! let summary = store.put_events(records, None, ConflictPolicy::Fail)?;
//!
//! for header in store.scan_headers(ScanOptions::default(), Default::default()) {
//!     println!("{:?}", header?);
//! }
//! ```

pub mod dimension;
pub mod error;
pub mod import;
pub mod scan;
pub mod store;
pub mod tables;

pub use dimension::{
    DescribedRow, DescriptionCache, InsertionTracker, OperationInfoCache, ProviderInfoCache,
    TaskInfoCache,
};
pub use error::{DimensionError, StoreError};
pub use import::{ConflictPolicy, ImportJob, ImportSummary, JobState};
pub use scan::{ChunkedScanner, HeaderSource, MIN_CHUNK_SIZE, PayloadSource, RangeSource, ScanOptions};
pub use store::{Direction, EventStore, HeaderFilter, OverviewRow, StoreConfig};
