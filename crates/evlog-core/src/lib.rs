//! # evlog core
//!
//! Core types shared by the evlog storage and archive crates.
//!
//! ## Key Types
//!
//! - [`HeaderRow`] / [`PayloadRow`]: one normalized event record, split into
//!   its compact header and its raw payload text
//! - [`ProviderInfoRow`], [`TaskInfoRow`], [`OperationInfoRow`]: dimension rows
//!   referenced by surrogate keys from header rows
//! - [`BackedMap`]: write buffer layered over a read-through backing map
//! - [`EventRecord`]: the seam between a raw record source and ingestion
//!
//! Timestamps are signed 100-nanosecond ticks since the Unix epoch; see
//! [`time`] for conversions.

pub mod error;
pub mod overlay;
pub mod record;
pub mod rows;
pub mod time;

pub use error::CoreError;
pub use overlay::{BackedMap, HasKey, KeyedMap};
pub use record::{EventRecord, RawEventRecord};
pub use rows::*;
pub use time::{EpochTicks, TICKS_PER_SECOND};
