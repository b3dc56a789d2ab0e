//! The event store
//!
//! [`EventStore`] owns the redb database holding the header, payload and
//! dimension tables. Reads run in their own read transaction; all writes go
//! through an [`ImportJob`].

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use evlog_core::{
    EventRecord, HeaderRow, OperationInfoRow, PayloadRow, ProviderId, ProviderInfoRow,
    TaskInfoRow,
};
use redb::{AccessGuard, Database, ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::import::{ConflictPolicy, ImportJob, ImportSummary};
use crate::tables::{
    self, EVENT_HEADERS, EVENT_PAYLOADS, OPERATION_INFO, PROVIDER_INFO, TASK_INFO,
};

/// Configuration for the event store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Whether import jobs may be started
    pub writable: bool,
    /// Create the database if it does not exist yet
    pub create: bool,
    /// Rows fetched per query by scanners over this store
    pub chunk_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/evlog.redb"),
            writable: false,
            create: false,
            chunk_size: 1000,
        }
    }
}

impl StoreConfig {
    /// Configuration for a writable store at the given path, created on demand
    pub fn writable(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            writable: true,
            create: true,
            ..Default::default()
        }
    }
}

/// Scan direction over record ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Optional restrictions on header queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFilter {
    pub event_id: Option<i32>,
    pub provider_id: Option<ProviderId>,
    pub task_id: Option<i32>,
    /// Inclusive lower stamp bound
    pub stamp_min: Option<i64>,
    /// Exclusive upper stamp bound
    pub stamp_max: Option<i64>,
}

impl HeaderFilter {
    pub fn matches(&self, row: &HeaderRow) -> bool {
        self.event_id.is_none_or(|id| row.event_id == id)
            && self.provider_id.is_none_or(|id| row.provider_id == id)
            && self.task_id.is_none_or(|id| row.task_id == id)
            && self.stamp_min.is_none_or(|min| row.stamp >= min)
            && self.stamp_max.is_none_or(|max| row.stamp < max)
    }

    /// Only rows stamped at or after `stamp`
    pub fn since(stamp: i64) -> Self {
        Self {
            stamp_min: Some(stamp),
            ..Default::default()
        }
    }
}

/// Stored records sharing one (event id, task id) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewRow {
    pub event_id: i32,
    pub task_id: i32,
    /// Text description of the task, if any task row has one
    pub task_label: Option<String>,
    pub count: u64,
    pub rid_min: i64,
    pub rid_max: i64,
    pub stamp_min: i64,
    pub stamp_max: i64,
    /// Sum of payload sizes in bytes
    pub total_size: u64,
}

impl OverviewRow {
    fn first(header: &HeaderRow, size: u64) -> Self {
        Self {
            event_id: header.event_id,
            task_id: header.task_id,
            task_label: None,
            count: 1,
            rid_min: header.rid,
            rid_max: header.rid,
            stamp_min: header.stamp,
            stamp_max: header.stamp,
            total_size: size,
        }
    }

    fn observe(&mut self, header: &HeaderRow, size: u64) {
        self.count += 1;
        self.rid_min = self.rid_min.min(header.rid);
        self.rid_max = self.rid_max.max(header.rid);
        self.stamp_min = self.stamp_min.min(header.stamp);
        self.stamp_max = self.stamp_max.max(header.stamp);
        self.total_size += size;
    }
}

/// Store of normalized event rows
pub struct EventStore {
    db: Arc<Database>,
    config: StoreConfig,
}

impl EventStore {
    /// Open the database, creating it first when the config allows
    ///
    /// Only writable stores create missing tables; reads treat a missing
    /// table as empty.
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let db = if config.create {
            if let Some(parent) = config.db_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            Database::create(&config.db_path)?
        } else {
            if !config.db_path.exists() {
                return Err(StoreError::not_found(config.db_path.display().to_string()));
            }
            Database::open(&config.db_path)?
        };

        info!(writable = config.writable, "Opened event store");

        let store = Self {
            db: Arc::new(db),
            config,
        };
        if store.config.writable {
            store.init_tables()?;
        }
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        tables::create_all(&txn)?;
        txn.commit()?;
        debug!("Initialized event store tables");
        Ok(())
    }

    /// Get a reference to the database
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_writable(&self) -> bool {
        self.config.writable
    }

    /// Start an import job under the given conflict policy
    pub fn import_job(&self, policy: ConflictPolicy) -> Result<ImportJob, StoreError> {
        if !self.config.writable {
            return Err(StoreError::ReadOnly);
        }
        ImportJob::open(&self.db, policy)
    }

    /// Import records in one job, stopping after `cap` accepted records
    pub fn put_events<I>(
        &self,
        records: I,
        cap: Option<usize>,
        policy: ConflictPolicy,
    ) -> Result<ImportSummary, StoreError>
    where
        I: IntoIterator,
        I::Item: EventRecord,
    {
        let mut job = self.import_job(policy)?;
        let mut accepted = 0;
        for record in records {
            if cap.is_some_and(|cap| accepted >= cap) {
                break;
            }
            if job.process_record(&record)? {
                accepted += 1;
            }
        }
        job.commit()
    }

    /// Header row for a record id
    pub fn find_header(&self, rid: i64) -> Result<Option<HeaderRow>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_existing(&txn, EVENT_HEADERS)? else {
            return Ok(None);
        };
        match table.get(rid)? {
            Some(value) => Ok(Some(tables::decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Payload text for a record id
    pub fn find_payload(&self, rid: i64) -> Result<Option<String>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_existing(&txn, EVENT_PAYLOADS)? else {
            return Ok(None);
        };
        Ok(table.get(rid)?.map(|value| value.value().to_string()))
    }

    /// Up to `limit` header rows with ids in `lower..=upper` passing `filter`
    pub fn query_headers(
        &self,
        lower: i64,
        upper: i64,
        filter: &HeaderFilter,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<HeaderRow>, StoreError> {
        if lower > upper || limit == 0 {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_existing(&txn, EVENT_HEADERS)? else {
            return Ok(Vec::new());
        };
        let range = table.range(lower..=upper)?;
        match direction {
            Direction::Ascending => collect_headers(range, filter, limit),
            Direction::Descending => collect_headers(range.rev(), filter, limit),
        }
    }

    /// Up to `limit` payload rows with ids in `lower..=upper`
    pub fn query_payloads(
        &self,
        lower: i64,
        upper: i64,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<PayloadRow>, StoreError> {
        if lower > upper || limit == 0 {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_existing(&txn, EVENT_PAYLOADS)? else {
            return Ok(Vec::new());
        };
        let range = table.range(lower..=upper)?;
        match direction {
            Direction::Ascending => collect_payloads(range, limit),
            Direction::Descending => collect_payloads(range.rev(), limit),
        }
    }

    /// First header at or after `rid`
    pub fn first_header_from(&self, rid: i64) -> Result<Option<HeaderRow>, StoreError> {
        let rows = self.query_headers(rid, i64::MAX, &HeaderFilter::default(), Direction::Ascending, 1)?;
        Ok(rows.into_iter().next())
    }

    /// Last header at or before `rid`
    pub fn last_header_upto(&self, rid: i64) -> Result<Option<HeaderRow>, StoreError> {
        let rows = self.query_headers(i64::MIN, rid, &HeaderFilter::default(), Direction::Descending, 1)?;
        Ok(rows.into_iter().next())
    }

    /// Smallest stored record id
    pub fn min_record_id(&self) -> Result<Option<i64>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_existing(&txn, EVENT_HEADERS)? else {
            return Ok(None);
        };
        Ok(table.first()?.map(|(key, _)| key.value()))
    }

    /// Largest stored record id
    pub fn max_record_id(&self) -> Result<Option<i64>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_existing(&txn, EVENT_HEADERS)? else {
            return Ok(None);
        };
        Ok(table.last()?.map(|(key, _)| key.value()))
    }

    /// Number of stored event records
    pub fn record_count(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        match tables::open_existing(&txn, EVENT_HEADERS)? {
            Some(table) => Ok(table.len()?),
            None => Ok(0),
        }
    }

    /// All persisted provider rows
    pub fn all_providers(&self) -> Result<Vec<ProviderInfoRow>, StoreError> {
        let txn = self.db.begin_read()?;
        tables::read_table(&txn, PROVIDER_INFO)
    }

    /// All persisted task rows
    pub fn all_tasks(&self) -> Result<Vec<TaskInfoRow>, StoreError> {
        let txn = self.db.begin_read()?;
        tables::read_table(&txn, TASK_INFO)
    }

    /// All persisted operation rows
    pub fn all_operations(&self) -> Result<Vec<OperationInfoRow>, StoreError> {
        let txn = self.db.begin_read()?;
        tables::read_table(&txn, OPERATION_INFO)
    }

    /// One row per (event id, task id) pair, ordered by event id then task id
    #[instrument(skip(self))]
    pub fn overview(&self) -> Result<Vec<OverviewRow>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(headers) = tables::open_existing(&txn, EVENT_HEADERS)? else {
            return Ok(Vec::new());
        };
        let payloads = tables::open_existing(&txn, EVENT_PAYLOADS)?;

        let mut groups: BTreeMap<(i32, i32), OverviewRow> = BTreeMap::new();
        for entry in headers.iter()? {
            let (_rid, value) = entry?;
            let header: HeaderRow = tables::decode(value.value())?;
            let size = match &payloads {
                Some(table) => table.get(header.rid)?.map_or(0, |p| p.value().len() as u64),
                None => 0,
            };
            groups
                .entry((header.event_id, header.task_id))
                .and_modify(|row| row.observe(&header, size))
                .or_insert_with(|| OverviewRow::first(&header, size));
        }

        let mut labels = HashMap::new();
        for task in tables::read_table::<_, TaskInfoRow>(&txn, TASK_INFO)? {
            if let Some(text) = task.description.as_text() {
                labels
                    .entry((task.key.event_id, task.key.task_id))
                    .or_insert_with(|| text.to_string());
            }
        }

        debug!(groups = groups.len(), "Built store overview");
        Ok(groups
            .into_iter()
            .map(|(key, mut row)| {
                row.task_label = labels.remove(&key);
                row
            })
            .collect())
    }

    /// Provider row by surrogate id
    pub fn find_provider(&self, id: ProviderId) -> Result<Option<ProviderInfoRow>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_existing(&txn, PROVIDER_INFO)? else {
            return Ok(None);
        };
        match table.get(id)? {
            Some(value) => Ok(Some(tables::decode(value.value())?)),
            None => Ok(None),
        }
    }
}

type Entry<'a, V> = Result<(AccessGuard<'a, i64>, AccessGuard<'a, V>), redb::StorageError>;

fn collect_headers<'a>(
    entries: impl Iterator<Item = Entry<'a, &'static [u8]>>,
    filter: &HeaderFilter,
    limit: usize,
) -> Result<Vec<HeaderRow>, StoreError> {
    let mut rows = Vec::new();
    for entry in entries {
        let (_rid, value) = entry?;
        let row: HeaderRow = tables::decode(value.value())?;
        if filter.matches(&row) {
            rows.push(row);
            if rows.len() >= limit {
                break;
            }
        }
    }
    Ok(rows)
}

fn collect_payloads<'a>(
    entries: impl Iterator<Item = Entry<'a, &'static str>>,
    limit: usize,
) -> Result<Vec<PayloadRow>, StoreError> {
    let mut rows = Vec::with_capacity(limit.min(1024));
    for entry in entries.take(limit) {
        let (rid, value) = entry?;
        rows.push(PayloadRow {
            rid: rid.value(),
            payload: value.value().to_string(),
        });
    }
    Ok(rows)
}
