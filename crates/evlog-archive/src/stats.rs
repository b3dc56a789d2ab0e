//! Running statistics over the rows written to an archive

use evlog_core::PayloadRow;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowStatistics {
    pub count: u64,
    pub rid_min: Option<i64>,
    pub rid_max: Option<i64>,
    pub stamp_min: Option<i64>,
    pub stamp_max: Option<i64>,
    /// Sum of payload sizes in bytes
    pub total_size: u64,
    /// Largest payload size in bytes
    pub max_size: usize,
}

impl RowStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one payload row
    pub fn observe(&mut self, row: &PayloadRow) {
        self.count += 1;
        self.rid_min = Some(self.rid_min.map_or(row.rid, |min| min.min(row.rid)));
        self.rid_max = Some(self.rid_max.map_or(row.rid, |max| max.max(row.rid)));
        let size = row.payload.len();
        self.total_size += size as u64;
        self.max_size = self.max_size.max(size);
    }

    /// Account for one timestamp
    pub fn observe_stamp(&mut self, stamp: i64) {
        self.stamp_min = Some(self.stamp_min.map_or(stamp, |min| min.min(stamp)));
        self.stamp_max = Some(self.stamp_max.map_or(stamp, |max| max.max(stamp)));
    }

    /// Mean payload size in bytes
    pub fn average_size(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_size as f64 / self.count as f64
        }
    }
}
