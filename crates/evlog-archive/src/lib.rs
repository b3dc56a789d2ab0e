//! # evlog archive
//!
//! Converts dense runs of the event store into immutable monthly archive
//! files.
//!
//! ## Components
//!
//! - [`ArchiveDescriptor`]: identity of an archive and its file name grammar
//! - [`ArchiveBuilder`]: resolves a month-bounded record range and writes it
//! - [`codec`]: length-prefixed and delimited blob framings, optionally
//!   gzip-compressed
//!
//! ## Example
//!
//! ```ignore
//! use evlog_archive::{ArchiveBuilder, ArchiveSettings};
//!
//! let mut builder = ArchiveBuilder::new(&store, ArchiveSettings::default(), 1, None);
//! builder.validate()??;
//! let summary = builder.build()?;
//! println!("{} records in {}", summary.stats.count, summary.path.display());
//! ```

pub mod builder;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod stats;

pub use builder::{ArchiveBuilder, ArchivePlan, ArchiveSettings, ArchiveSummary, Validation, open_archive};
pub use codec::{BlobReader, BlobWriter, Compression, Framing};
pub use descriptor::{ArchiveDescriptor, default_machine_name, is_valid_job_name, is_valid_machine_name};
pub use error::{ArchiveError, CodecError, ValidationFailure};
pub use stats::RowStatistics;
