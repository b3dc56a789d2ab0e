//! Monthly archive planning and creation
//!
//! An [`ArchiveBuilder`] resolves a contiguous run of records that all fall
//! in one calendar month, then streams their payloads into a sealed archive
//! file.
//!
//! ```ignore
//! let mut builder = ArchiveBuilder::new(&store, settings, 1, None);
//! match builder.validate()? {
//!     Ok(plan) => println!("will write {}", plan.target.display()),
//!     Err(failure) => return Err(failure.into()),
//! }
//! let summary = builder.build()?;
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use evlog_core::HeaderRow;
use evlog_core::time::{next_month_start, year_month};
use evlog_storage::{Direction, EventStore, HeaderFilter, ScanOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::codec::{BlobReader, BlobWriter, Compression, Framing};
use crate::descriptor::{ArchiveDescriptor, default_machine_name};
use crate::error::{ArchiveError, ValidationFailure};
use crate::stats::RowStatistics;

/// Where and how archives are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Machine name used in archive file names
    pub machine: String,
    /// Job name used in archive file names
    pub job: String,
    /// Folder receiving archive files
    pub archive_dir: PathBuf,
    pub compression: Compression,
    pub framing: Framing,
    /// Rows fetched per store query while writing
    pub chunk_size: usize,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            machine: default_machine_name(),
            job: "events".to_string(),
            archive_dir: PathBuf::from("./archive"),
            compression: Compression::Gzip,
            framing: Framing::Tlob,
            chunk_size: 1000,
        }
    }
}

/// A validated archive request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePlan {
    /// Sealed descriptor of the file to write
    pub descriptor: ArchiveDescriptor,
    pub rid_min: i64,
    pub rid_max: i64,
    /// Stamp of the first record
    pub start_stamp: i64,
    /// Stamp of the last record
    pub end_stamp: i64,
    /// Full path of the file to write
    pub target: PathBuf,
}

/// Outcome of validating an archive request
pub type Validation = Result<ArchivePlan, ValidationFailure>;

/// Result of a finished build
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub descriptor: ArchiveDescriptor,
    pub stats: RowStatistics,
}

/// Plans and writes one archive file
pub struct ArchiveBuilder<'a> {
    store: &'a EventStore,
    settings: ArchiveSettings,
    start: i64,
    end: Option<i64>,
    validation: Option<Validation>,
}

impl<'a> ArchiveBuilder<'a> {
    /// Archive from record `start`, through `end` or the end of its month
    pub fn new(store: &'a EventStore, settings: ArchiveSettings, start: i64, end: Option<i64>) -> Self {
        Self {
            store,
            settings,
            start,
            end,
            validation: None,
        }
    }

    pub fn settings(&self) -> &ArchiveSettings {
        &self.settings
    }

    /// The cached validation outcome, if [`validate`](Self::validate) ran
    pub fn validation(&self) -> Option<&Validation> {
        self.validation.as_ref()
    }

    /// Resolve the record range and target file
    ///
    /// The first outcome is cached and returned by every later call.
    /// Store and naming errors are returned as `Err` and not cached.
    pub fn validate(&mut self) -> Result<Validation, ArchiveError> {
        if let Some(validation) = &self.validation {
            return Ok(validation.clone());
        }
        let validation = self.resolve()?;
        match &validation {
            Ok(plan) => debug!(
                rid_min = plan.rid_min,
                rid_max = plan.rid_max,
                target = %plan.target.display(),
                "Archive request validated"
            ),
            Err(failure) => debug!(%failure, "Archive request rejected"),
        }
        self.validation = Some(validation.clone());
        Ok(validation)
    }

    fn resolve(&self) -> Result<Validation, ArchiveError> {
        if let Some(end) = self.end
            && end < self.start
        {
            return Ok(Err(ValidationFailure::EndBeforeStart {
                start: self.start,
                end,
            }));
        }

        let Some(first) = self.store.first_header_from(self.start)? else {
            return Ok(Err(ValidationFailure::NoRecordsFrom(self.start)));
        };
        let (year, month) = year_month(first.stamp)?;

        let last = match self.end {
            Some(end) => match self.store.last_header_upto(end)? {
                Some(row) if row.rid >= first.rid => row,
                _ => return Ok(Err(ValidationFailure::NoRecordsUpTo(end))),
            },
            None => self.month_end(&first, next_month_start(year, month)?)?,
        };

        if year_month(last.stamp)? != (year, month) {
            return Ok(Err(ValidationFailure::SpansMonths {
                start: first.rid,
                end: last.rid,
            }));
        }

        let mut descriptor = ArchiveDescriptor::unsealed(
            self.settings.machine.as_str(),
            self.settings.job.as_str(),
            year,
            month,
            self.settings.compression.is_compressed(),
        )?;
        descriptor.seal(first.rid, last.rid)?;

        if let Some(existing) = existing_target(&self.settings.archive_dir, &descriptor)? {
            return Ok(Err(ValidationFailure::TargetExists(existing)));
        }

        Ok(Ok(ArchivePlan {
            target: self.settings.archive_dir.join(descriptor.file_name()),
            descriptor,
            rid_min: first.rid,
            rid_max: last.rid,
            start_stamp: first.stamp,
            end_stamp: last.stamp,
        }))
    }

    /// Last row before the first one stamped at or after `cutoff`
    fn month_end(&self, first: &HeaderRow, cutoff: i64) -> Result<HeaderRow, ArchiveError> {
        let next_month = self.store.query_headers(
            first.rid,
            i64::MAX,
            &HeaderFilter::since(cutoff),
            Direction::Ascending,
            1,
        )?;
        let upper = match next_month.first() {
            Some(row) => row.rid - 1,
            None => i64::MAX,
        };
        Ok(self
            .store
            .last_header_upto(upper)?
            .unwrap_or_else(|| first.clone()))
    }

    /// Write the validated archive
    ///
    /// The payloads go to a temporary file in the archive folder that is
    /// renamed into place once synced.
    #[instrument(skip(self), fields(job = %self.settings.job, start = self.start))]
    pub fn build(&self) -> Result<ArchiveSummary, ArchiveError> {
        let plan = match &self.validation {
            None => return Err(ArchiveError::NotValidated),
            Some(Err(failure)) => return Err(failure.clone().into()),
            Some(Ok(plan)) => plan,
        };

        fs::create_dir_all(&self.settings.archive_dir)?;
        if let Some(existing) = existing_target(&self.settings.archive_dir, &plan.descriptor)? {
            return Err(ValidationFailure::TargetExists(existing).into());
        }

        let temp = self
            .settings
            .archive_dir
            .join(format!("{}.tmp", plan.descriptor.file_name()));
        let stats = match self.write_rows(plan, &temp) {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "Archive write failed");
                let _ = fs::remove_file(&temp);
                return Err(err);
            }
        };

        if let Some(existing) = existing_target(&self.settings.archive_dir, &plan.descriptor)? {
            let _ = fs::remove_file(&temp);
            return Err(ValidationFailure::TargetExists(existing).into());
        }
        fs::rename(&temp, &plan.target)?;

        info!(
            path = %plan.target.display(),
            records = stats.count,
            bytes = stats.total_size,
            "Archive written"
        );
        Ok(ArchiveSummary {
            path: plan.target.clone(),
            descriptor: plan.descriptor.clone(),
            stats,
        })
    }

    fn write_rows(&self, plan: &ArchivePlan, path: &Path) -> Result<RowStatistics, ArchiveError> {
        let file = File::create(path)?;
        let mut writer = BlobWriter::new(
            BufWriter::new(file),
            self.settings.framing,
            self.settings.compression,
        )?;

        let mut stats = RowStatistics::new();
        stats.observe_stamp(plan.start_stamp);
        stats.observe_stamp(plan.end_stamp);

        let options =
            ScanOptions::range(plan.rid_min, plan.rid_max).with_chunk_size(self.settings.chunk_size);
        for row in self.store.scan_payloads(options) {
            let row = row?;
            writer.write(&row.payload)?;
            stats.observe(&row);
        }

        let file = writer
            .finish()?
            .into_inner()
            .map_err(|err| ArchiveError::from(err.into_error()))?;
        file.sync_all()?;
        Ok(stats)
    }
}

/// Path of an existing compressed or uncompressed file for `descriptor`
fn existing_target(
    folder: &Path,
    descriptor: &ArchiveDescriptor,
) -> Result<Option<PathBuf>, ArchiveError> {
    for compressed in [true, false] {
        let path = folder.join(descriptor.sealed_name(compressed)?);
        if path.try_exists()? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Open an archive file for reading, decompressing when its name says so
pub fn open_archive(
    path: &Path,
    framing: Framing,
) -> Result<BlobReader<BufReader<File>>, ArchiveError> {
    let name = path.to_string_lossy();
    let descriptor = ArchiveDescriptor::from_file_name(&name)?;
    let file = File::open(path)?;
    Ok(BlobReader::new(
        BufReader::new(file),
        framing,
        Compression::from_flag(descriptor.is_compressed()),
    ))
}
