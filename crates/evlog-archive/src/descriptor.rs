//! Archive descriptors and file naming
//!
//! Archive files are named
//! `<machine>.<job>.archive.<yyyy>-<mm>.<range>.evarc[.gz]`, where
//! `<range>` is `.` while the archive is unsealed and `NNNNNN-NNNNNN` (record
//! ids zero-padded to at least six digits) once it is sealed.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::ArchiveError;

static JOB_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z][a-z0-9]*([-_][a-z0-9]+)*$").expect("valid regex")
});

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<machine>[^.]+)\.(?P<job>[^.]+)\.archive\.(?P<year>\d{4})-(?P<month>\d{2})\.(?:(?P<min>\d+)-(?P<max>\d+)|\.|-)\.evarc(?P<gz>\.gz)?$",
    )
    .expect("valid regex")
});

/// Whether `name` is usable as a job name
pub fn is_valid_job_name(name: &str) -> bool {
    JOB_NAME.is_match(name)
}

/// Whether `name` is usable as a machine name
pub fn is_valid_machine_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['.', '/', '\\'])
}

/// The local host name, reduced to its first label
pub fn default_machine_name() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .and_then(|host| host.split('.').next().map(str::to_string))
        .filter(|host| is_valid_machine_name(host))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Identity of one monthly archive file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    machine: String,
    job: String,
    year: i32,
    month: u32,
    rid_min: Option<i64>,
    rid_max: Option<i64>,
    compressed: bool,
}

impl ArchiveDescriptor {
    /// Create a descriptor, validating every field
    ///
    /// Record id bounds below 1 are treated as absent.
    pub fn new(
        machine: impl Into<String>,
        job: impl Into<String>,
        year: i32,
        month: u32,
        rid_min: Option<i64>,
        rid_max: Option<i64>,
        compressed: bool,
    ) -> Result<Self, ArchiveError> {
        let machine = machine.into();
        let job = job.into();
        if !is_valid_machine_name(&machine) {
            return Err(ArchiveError::InvalidDescriptor(format!(
                "invalid machine name '{machine}'"
            )));
        }
        if !is_valid_job_name(&job) {
            return Err(ArchiveError::InvalidDescriptor(format!(
                "invalid job name '{job}'"
            )));
        }
        if !(2000..=2099).contains(&year) {
            return Err(ArchiveError::InvalidDescriptor(format!(
                "year {year} must be in the range 2000-2099"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(ArchiveError::InvalidDescriptor(format!(
                "month {month} must be in the range 01-12"
            )));
        }
        let rid_min = rid_min.filter(|rid| *rid >= 1);
        let rid_max = rid_max.filter(|rid| *rid >= 1);
        if let (Some(min), Some(max)) = (rid_min, rid_max)
            && min > max
        {
            return Err(ArchiveError::InvalidDescriptor(format!(
                "record id range {min}-{max} is inverted"
            )));
        }
        Ok(Self {
            machine,
            job,
            year,
            month,
            rid_min,
            rid_max,
            compressed,
        })
    }

    /// Create an unsealed descriptor
    pub fn unsealed(
        machine: impl Into<String>,
        job: impl Into<String>,
        year: i32,
        month: u32,
        compressed: bool,
    ) -> Result<Self, ArchiveError> {
        Self::new(machine, job, year, month, None, None, compressed)
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `yyyy-mm`
    pub fn month_tag(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn rid_min(&self) -> Option<i64> {
        self.rid_min
    }

    pub fn rid_max(&self) -> Option<i64> {
        self.rid_max
    }

    pub fn is_sealed(&self) -> bool {
        self.rid_min.is_some() && self.rid_max.is_some()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    fn prefix(&self) -> String {
        format!("{}.{}.archive.{}", self.machine, self.job, self.month_tag())
    }

    fn suffix(compressed: bool) -> &'static str {
        if compressed { ".evarc.gz" } else { ".evarc" }
    }

    /// Name of the file while the archive is still open
    pub fn unsealed_name(&self, compressed: bool) -> String {
        format!("{}..{}", self.prefix(), Self::suffix(compressed))
    }

    /// Name of the sealed archive file
    pub fn sealed_name(&self, compressed: bool) -> Result<String, ArchiveError> {
        match (self.rid_min, self.rid_max) {
            (Some(min), Some(max)) => Ok(format!(
                "{}.{min:06}-{max:06}{}",
                self.prefix(),
                Self::suffix(compressed)
            )),
            _ => Err(ArchiveError::NotSealed(self.unsealed_name(compressed))),
        }
    }

    /// Current file name, honoring the compression flag
    pub fn file_name(&self) -> String {
        self.sealed_name(self.compressed)
            .unwrap_or_else(|_| self.unsealed_name(self.compressed))
    }

    /// Fix the record id range of this archive
    ///
    /// Sealing again with the identical range is a no-op; any other range,
    /// or a range conflicting with a bound set at construction, fails.
    pub fn seal(&mut self, rid_min: i64, rid_max: i64) -> Result<(), ArchiveError> {
        let conflict = || ArchiveError::SealConflict {
            current: self.file_name(),
            rid_min,
            rid_max,
        };
        if rid_min < 1 || rid_max < 1 || rid_min > rid_max {
            return Err(conflict());
        }
        if self.rid_min.is_some_and(|min| min != rid_min)
            || self.rid_max.is_some_and(|max| max != rid_max)
        {
            return Err(conflict());
        }
        self.rid_min = Some(rid_min);
        self.rid_max = Some(rid_max);
        Ok(())
    }

    /// Parse a file name (a path is reduced to its final component)
    pub fn from_file_name(file_name: &str) -> Result<Self, ArchiveError> {
        let name = Path::new(file_name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(file_name);
        let caps = FILE_NAME
            .captures(name)
            .ok_or_else(|| ArchiveError::invalid_name(name, "does not match the archive naming pattern"))?;

        let number = |group: &str| -> Result<Option<i64>, ArchiveError> {
            caps.name(group)
                .map(|m| m.as_str().parse::<i64>())
                .transpose()
                .map_err(|e| ArchiveError::invalid_name(name, format!("bad {group}: {e}")))
        };
        let year = number("year")?.unwrap_or_default();
        let month = number("month")?.unwrap_or_default();
        Self::new(
            &caps["machine"],
            &caps["job"],
            year as i32,
            month as u32,
            number("min")?,
            number("max")?,
            caps.name("gz").is_some(),
        )
    }

    /// Discover the archives of one job and machine in a folder
    ///
    /// Files that look like archives but fail to parse are skipped with a
    /// warning. Results are sorted by month and starting record id.
    pub fn find_archives(
        folder: &Path,
        job: &str,
        machine: &str,
    ) -> Result<Vec<ArchiveDescriptor>, ArchiveError> {
        if !is_valid_job_name(job) {
            return Err(ArchiveError::InvalidDescriptor(format!(
                "invalid job name '{job}'"
            )));
        }
        // Same case rule as the file name pattern
        let prefix = format!("{machine}.{job}.archive.").to_lowercase();
        let mut found = Vec::new();
        for entry in std::fs::read_dir(folder)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let folded = name.to_lowercase();
            if !folded.starts_with(&prefix)
                || !(folded.ends_with(".evarc") || folded.ends_with(".evarc.gz"))
            {
                continue;
            }
            match Self::from_file_name(name) {
                Ok(descriptor) => found.push(descriptor),
                Err(err) => warn!(file = name, error = %err, "Ignoring unparsable archive file"),
            }
        }
        found.sort_by_key(|d| (d.year, d.month, d.rid_min));
        debug!(folder = %folder.display(), count = found.len(), "Found archives");
        Ok(found)
    }
}

impl fmt::Display for ArchiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
