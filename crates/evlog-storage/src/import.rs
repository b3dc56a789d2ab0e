//! Import jobs
//!
//! An [`ImportJob`] wraps one redb write transaction. It seeds the dimension
//! caches from the rows visible inside that transaction, writes one header
//! and one payload row per accepted record, and flushes the new dimension
//! rows on commit. Dropping a job without committing rolls everything back.

use std::fmt;
use std::str::FromStr;

use evlog_core::EventRecord;
use redb::{Database, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dimension::InsertionTracker;
use crate::error::{DimensionError, StoreError};
use crate::tables::{
    self, EVENT_HEADERS, EVENT_PAYLOADS, OPERATION_INFO, PROVIDER_INFO, TASK_INFO,
};

/// What to do with a record whose id is already stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Abort the job
    #[default]
    Fail,
    /// Overwrite the stored header and payload
    Replace,
    /// Keep the stored record and skip the new one
    Ignore,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "replace" => Ok(Self::Replace),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("unknown conflict policy '{other}'")),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fail => "fail",
            Self::Replace => "replace",
            Self::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of an import job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Open,
    Committed,
    Aborted,
}

/// Counters reported when a job commits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Records written (including replacements)
    pub inserted: usize,
    /// Records that replaced a stored one
    pub replaced: usize,
    /// Records skipped because their id was already stored
    pub skipped: usize,
    /// Records lacking a record id or timestamp
    pub malformed: usize,
    pub new_providers: usize,
    pub new_tasks: usize,
    pub new_operations: usize,
    pub min_rid: Option<i64>,
    pub max_rid: Option<i64>,
}

impl ImportSummary {
    fn note_rid(&mut self, rid: i64) {
        self.min_rid = Some(self.min_rid.map_or(rid, |min| min.min(rid)));
        self.max_rid = Some(self.max_rid.map_or(rid, |max| max.max(rid)));
    }
}

/// One batch of record insertions inside a single write transaction
pub struct ImportJob {
    txn: Option<WriteTransaction>,
    tracker: InsertionTracker,
    policy: ConflictPolicy,
    state: JobState,
    summary: ImportSummary,
}

impl ImportJob {
    pub(crate) fn open(db: &Database, policy: ConflictPolicy) -> Result<Self, StoreError> {
        let txn = db.begin_write()?;
        tables::create_all(&txn)?;
        let tracker = InsertionTracker::new(
            tables::read_rows(&txn.open_table(PROVIDER_INFO)?)?,
            tables::read_rows(&txn.open_table(TASK_INFO)?)?,
            tables::read_rows(&txn.open_table(OPERATION_INFO)?)?,
        )?;
        info!(
            %policy,
            providers = tracker.providers.len(),
            "Import job opened"
        );
        Ok(Self {
            txn: Some(txn),
            tracker,
            policy,
            state: JobState::Open,
            summary: ImportSummary::default(),
        })
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// The dimension caches of this job
    pub fn tracker(&self) -> &InsertionTracker {
        &self.tracker
    }

    /// Counters accumulated so far
    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// Process one raw record
    ///
    /// Returns `Ok(false)` when the record was skipped: it lacks a record id
    /// or timestamp, or its id is already stored under
    /// [`ConflictPolicy::Ignore`]. Any error aborts the job.
    pub fn process_record<E>(&mut self, record: &E) -> Result<bool, StoreError>
    where
        E: EventRecord + ?Sized,
    {
        if self.state != JobState::Open {
            return Err(StoreError::JobClosed);
        }
        match self.insert_record(record) {
            Ok(stored) => Ok(stored),
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn insert_record<E>(&mut self, record: &E) -> Result<bool, StoreError>
    where
        E: EventRecord + ?Sized,
    {
        let (Some(rid), Some(stamp)) = (record.rid(), record.timestamp()) else {
            self.summary.malformed += 1;
            debug!(rid = ?record.rid(), "Skipping record without id or timestamp");
            return Ok(false);
        };

        let txn = self.txn.as_ref().ok_or(StoreError::JobClosed)?;
        let mut headers = txn.open_table(EVENT_HEADERS)?;
        if headers.get(rid)?.is_some() {
            match self.policy {
                ConflictPolicy::Fail => return Err(StoreError::DuplicateRecord(rid)),
                ConflictPolicy::Ignore => {
                    self.summary.skipped += 1;
                    return Ok(false);
                }
                ConflictPolicy::Replace => self.summary.replaced += 1,
            }
        }

        let header = self.tracker.make_header(record, rid, stamp)?;
        headers.insert(rid, tables::encode(&header)?.as_slice())?;
        let mut payloads = txn.open_table(EVENT_PAYLOADS)?;
        payloads.insert(rid, record.payload())?;

        self.summary.inserted += 1;
        self.summary.note_rid(rid);
        Ok(true)
    }

    fn fail(&mut self, err: &StoreError) {
        warn!(error = %err, "Aborting import job");
        self.rollback();
    }

    fn rollback(&mut self) {
        if let Some(txn) = self.txn.take()
            && let Err(err) = txn.abort()
        {
            warn!(error = %err, "Rollback failed");
        }
        self.state = JobState::Aborted;
    }

    /// Flush the new dimension rows and commit
    pub fn commit(mut self) -> Result<ImportSummary, StoreError> {
        if self.state != JobState::Open {
            return Err(StoreError::JobClosed);
        }
        let txn = self.txn.take().ok_or(StoreError::JobClosed)?;
        self.state = JobState::Aborted;

        if let Err(err) = self.flush(&txn) {
            warn!(error = %err, "Dimension flush failed, rolling back");
            if let Err(abort_err) = txn.abort() {
                warn!(error = %abort_err, "Rollback failed");
            }
            return Err(err);
        }
        txn.commit()?;
        self.state = JobState::Committed;

        let summary = std::mem::take(&mut self.summary);
        info!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            new_providers = summary.new_providers,
            "Import job committed"
        );
        Ok(summary)
    }

    /// Roll back every write of this job
    pub fn abort(mut self) -> Result<(), StoreError> {
        if self.state != JobState::Open {
            return Err(StoreError::JobClosed);
        }
        let txn = self.txn.take().ok_or(StoreError::JobClosed)?;
        self.state = JobState::Aborted;
        txn.abort()?;
        info!("Import job aborted");
        Ok(())
    }

    fn flush(&mut self, txn: &WriteTransaction) -> Result<(), StoreError> {
        {
            let mut table = txn.open_table(PROVIDER_INFO)?;
            for row in self.tracker.providers.newly_added() {
                if table.get(row.provider_id)?.is_some() {
                    return Err(DimensionError::AlreadyPersisted(row.provider_id).into());
                }
                table.insert(row.provider_id, tables::encode(row)?.as_slice())?;
            }
        }
        {
            let mut table = txn.open_table(TASK_INFO)?;
            for row in self.tracker.tasks.new_rows() {
                table.insert(row.key.as_tuple(), tables::encode(row)?.as_slice())?;
            }
        }
        {
            let mut table = txn.open_table(OPERATION_INFO)?;
            for row in self.tracker.operations.new_rows() {
                table.insert(row.key.as_tuple(), tables::encode(row)?.as_slice())?;
            }
        }

        self.summary.new_providers = self.tracker.providers.newly_added_count();
        self.summary.new_tasks = self.tracker.tasks.new_row_count();
        self.summary.new_operations = self.tracker.operations.new_row_count();
        debug!(
            providers = self.summary.new_providers,
            tasks = self.summary.new_tasks,
            operations = self.summary.new_operations,
            "Flushed dimension rows"
        );
        Ok(())
    }
}

impl Drop for ImportJob {
    fn drop(&mut self) {
        if self.state == JobState::Open {
            warn!("Import job dropped without commit, rolling back");
            self.rollback();
        }
    }
}
