//! Chunked cursor scans
//!
//! A [`ChunkedScanner`] turns a bounded range query into one lazy, ordered
//! row iterator. It holds at most one chunk in memory and issues the next
//! query only once the current chunk is drained.

use std::collections::VecDeque;

use evlog_core::{HeaderRow, PayloadRow};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{Direction, EventStore, HeaderFilter};

/// Smallest chunk a scanner will request
pub const MIN_CHUNK_SIZE: usize = 64;

/// A range query primitive: at most `limit` rows with ids in
/// `lower..=upper`, ordered by id in `direction`
pub trait RangeSource {
    type Row;

    fn query(
        &self,
        lower: i64,
        upper: i64,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<Self::Row>, StoreError>;

    /// The record id of a row returned by [`query`](Self::query)
    fn row_id(row: &Self::Row) -> i64;
}

/// Parameters of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Inclusive lower record id
    pub lower: i64,
    /// Inclusive upper record id
    pub upper: i64,
    pub direction: Direction,
    /// Total number of rows to return; `None` for all
    pub limit: Option<usize>,
    /// Rows per query, clamped to [`MIN_CHUNK_SIZE`]
    pub chunk_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            lower: 0,
            upper: i64::MAX,
            direction: Direction::Ascending,
            limit: None,
            chunk_size: 1000,
        }
    }
}

impl ScanOptions {
    /// Scan the inclusive id range `lower..=upper`
    pub fn range(lower: i64, upper: i64) -> Self {
        Self {
            lower,
            upper,
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Iterator over the rows of a [`RangeSource`], fetched a chunk at a time
pub struct ChunkedScanner<S: RangeSource> {
    source: S,
    lower: i64,
    upper: i64,
    direction: Direction,
    chunk_size: usize,
    remaining: Option<usize>,
    cursor: i64,
    buffer: VecDeque<S::Row>,
    exhausted: bool,
    chunks: usize,
}

impl<S: RangeSource> ChunkedScanner<S> {
    pub fn new(source: S, options: ScanOptions) -> Self {
        let cursor = match options.direction {
            Direction::Ascending => options.lower,
            Direction::Descending => options.upper,
        };
        Self {
            source,
            lower: options.lower,
            upper: options.upper,
            direction: options.direction,
            chunk_size: options.chunk_size.max(MIN_CHUNK_SIZE),
            remaining: options.limit,
            cursor,
            buffer: VecDeque::new(),
            exhausted: options.lower > options.upper,
            chunks: 0,
        }
    }

    /// The effective chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of queries issued so far
    pub fn chunks_fetched(&self) -> usize {
        self.chunks
    }

    fn fetch_chunk(&mut self) -> Result<(), StoreError> {
        let request = match self.remaining {
            Some(0) => {
                self.exhausted = true;
                return Ok(());
            }
            Some(remaining) => remaining.min(self.chunk_size),
            None => self.chunk_size,
        };
        let (lower, upper) = match self.direction {
            Direction::Ascending => (self.cursor, self.upper),
            Direction::Descending => (self.lower, self.cursor),
        };
        if lower > upper {
            self.exhausted = true;
            return Ok(());
        }

        let rows = self.source.query(lower, upper, self.direction, request)?;
        self.chunks += 1;
        debug!(lower, upper, rows = rows.len(), "Fetched chunk");

        if rows.len() < request {
            self.exhausted = true;
        }
        match rows.last().map(S::row_id) {
            Some(last) => {
                let next = match self.direction {
                    Direction::Ascending => last.checked_add(1),
                    Direction::Descending => last.checked_sub(1).filter(|next| *next >= 0),
                };
                match next {
                    Some(next) => self.cursor = next,
                    None => self.exhausted = true,
                }
            }
            None => self.exhausted = true,
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(rows.len());
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl<S: RangeSource> Iterator for ChunkedScanner<S> {
    type Item = Result<S::Row, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Some(Ok(row));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_chunk() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}

/// Filtered header rows of a store
pub struct HeaderSource<'a> {
    store: &'a EventStore,
    filter: HeaderFilter,
}

impl<'a> HeaderSource<'a> {
    pub fn new(store: &'a EventStore, filter: HeaderFilter) -> Self {
        Self { store, filter }
    }
}

impl RangeSource for HeaderSource<'_> {
    type Row = HeaderRow;

    fn query(
        &self,
        lower: i64,
        upper: i64,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<HeaderRow>, StoreError> {
        self.store
            .query_headers(lower, upper, &self.filter, direction, limit)
    }

    fn row_id(row: &HeaderRow) -> i64 {
        row.rid
    }
}

/// Payload rows of a store
pub struct PayloadSource<'a> {
    store: &'a EventStore,
}

impl<'a> PayloadSource<'a> {
    pub fn new(store: &'a EventStore) -> Self {
        Self { store }
    }
}

impl RangeSource for PayloadSource<'_> {
    type Row = PayloadRow;

    fn query(
        &self,
        lower: i64,
        upper: i64,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<PayloadRow>, StoreError> {
        self.store.query_payloads(lower, upper, direction, limit)
    }

    fn row_id(row: &PayloadRow) -> i64 {
        row.rid
    }
}

impl EventStore {
    /// Scan header rows matching `filter`
    pub fn scan_headers(
        &self,
        options: ScanOptions,
        filter: HeaderFilter,
    ) -> ChunkedScanner<HeaderSource<'_>> {
        ChunkedScanner::new(HeaderSource::new(self, filter), options)
    }

    /// Scan payload rows
    pub fn scan_payloads(&self, options: ScanOptions) -> ChunkedScanner<PayloadSource<'_>> {
        ChunkedScanner::new(PayloadSource::new(self), options)
    }
}
